use crate::market::entity::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 趋势方向判定结果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// # Summary
/// 趋势类指标：均线族与 MACD。
///
/// # Invariants
/// - `macd_histogram == macd - macd_signal`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendIndicators {
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    // 价格 > SMA20 > SMA50 且 MACD > 0 为看多；完全反向为看空
    pub direction: TrendDirection,
    // 趋势强度 [0, 1]
    pub strength: f64,
}

/// # Summary
/// 动量状态分类。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MomentumState {
    Overbought,
    Oversold,
    Neutral,
}

/// # Summary
/// 动量类指标：RSI、随机指标与威廉指标。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MomentumIndicators {
    // RSI(14)，Wilder 平滑
    pub rsi_14: f64,
    // 随机指标 %K (14)
    pub stoch_k: f64,
    // 随机指标 %D (%K 的 3 期均值)
    pub stoch_d: f64,
    // 威廉 %R (14)，取值 [-100, 0]
    pub williams_r: f64,
    pub state: MomentumState,
    // 动量强度 [0, 1]
    pub strength: f64,
}

/// # Summary
/// 波动水平分级：ATR 百分比 <1% 为低，>3% 为高。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolatilityLevel {
    Low,
    Normal,
    High,
}

/// # Summary
/// 波动类指标：布林带与真实波幅。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolatilityIndicators {
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub atr_14: f64,
    // ATR 相对收盘价的百分比
    pub atr_percent: f64,
    pub level: VolatilityLevel,
}

/// # Summary
/// 量能类指标：VWAP、OBV、量均线与筹码积累/派发线。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeIndicators {
    // 窗口内按典型价 (H+L+C)/3 加权的成交均价
    pub vwap: f64,
    // 按收盘方向累计的符号成交量
    pub obv: f64,
    // 20 期成交量均值
    pub volume_ma_20: f64,
    // 资金流乘数累计的积累/派发线
    pub ad_line: f64,
    // 量能是否确认当前价格方向
    pub confirms_price: bool,
}

/// # Summary
/// 分类别指标向量。每个类别独立可缺省，单类计算失败不拖垮整体。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndicatorVector {
    pub trend: Option<TrendIndicators>,
    pub momentum: Option<MomentumIndicators>,
    pub volatility: Option<VolatilityIndicators>,
    pub volume: Option<VolumeIndicators>,
}

/// # Summary
/// K 线形态种类 (最近 ≤5 根内识别)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatternKind {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    BullishHarami,
    BearishHarami,
}

/// # Summary
/// 单个已识别形态及其倾向。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandlePattern {
    pub kind: PatternKind,
    pub direction: TrendDirection,
    // 形态可信度 [0, 1]
    pub reliability: f64,
}

/// # Summary
/// 图表形态种类 (窗口级摆动结构，仅作咨询参考)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChartPatternKind {
    Triangle,
    HeadAndShoulders,
    DoubleTop,
    DoubleBottom,
}

/// # Summary
/// 单个已识别图表形态。可通过配置整体关闭。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartPattern {
    pub kind: ChartPatternKind,
    pub direction: TrendDirection,
    // 形态可信度 [0, 1]
    pub reliability: f64,
}

/// # Summary
/// Wyckoff 风格市场阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MarketRegime {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
}

/// # Summary
/// 支撑/阻力级别种类。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LevelKind {
    Support,
    Resistance,
}

/// # Summary
/// 单条价格级别：摆动点聚类的结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceLevel {
    pub kind: LevelKind,
    pub price: f64,
    // 级别强度 [0, 1]，随触及次数与新近度增长
    pub strength: f64,
    // 窗口内触及该价位带的次数
    pub touches: u32,
}

/// # Summary
/// 形态/阶段/级别分析汇总。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalysisReport {
    pub patterns: Vec<CandlePattern>,
    // 咨询性图表形态，配置关闭时恒为空
    pub chart_patterns: Vec<ChartPattern>,
    pub regime: Option<MarketRegime>,
    pub levels: Vec<PriceLevel>,
}

/// # Summary
/// 综合信号方向。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// # Summary
/// 加权融合后的交易信号摘要。
///
/// # Invariants
/// - `confidence` 恒被钳制在 [20, 95]。
/// - 权重固定：趋势 0.40、动量 0.35、量能 0.25。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalSummary {
    pub overall: SignalDirection,
    // 融合得分绝对值 [0, 1]
    pub magnitude: f64,
    // 置信度 [20, 95]
    pub confidence: f64,
    pub trend_score: f64,
    pub momentum_score: f64,
    pub volume_score: f64,
}

/// # Summary
/// 富化过程元数据：耗时、降级告警与部分结果标记。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichmentMeta {
    pub computed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    // 单类指标降级时的告警说明
    pub warnings: Vec<String>,
    // 因超时仅返回部分类别时为 true
    pub partial: bool,
}

/// # Summary
/// 富化完成的 K 线制品：基础 OHLCV + 指标 + 分析 + 信号。
///
/// # Invariants
/// - `base` 与产出它的已收盘 K 线逐位一致。
/// - 同一根已收盘 K 线至多产出一份富化制品。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedCandle {
    pub base: Candle,
    pub indicators: IndicatorVector,
    pub analysis: AnalysisReport,
    pub signal: Option<SignalSummary>,
    pub meta: EnrichmentMeta,
}
