use crate::enrich::entity::EnrichedCandle;
use crate::enrich::error::EnrichError;
use crate::market::entity::Candle;
use async_trait::async_trait;
use std::time::Duration;

/// # Summary
/// 单次富化调用的选项。
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    // 本次调用的截止时限
    pub deadline: Duration,
    // 指标计算要求的最少历史根数
    pub min_history: usize,
    // 超时时是否返回已完成类别的部分结果
    pub partial_on_timeout: bool,
    // 是否运行咨询性的图表形态识别
    pub chart_patterns: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(1000),
            min_history: 20,
            partial_on_timeout: false,
            chart_patterns: false,
        }
    }
}

/// # Summary
/// 富化引擎行为契约。
///
/// # Invariants
/// - 确定性：相同输入必须产出逐字节一致的指标、信号与置信度。
/// - 单类指标失败降级为省略该类并在元数据记录告警。
/// - 实现者可利用缓存做可选记忆化，但缓存缺失时必须能重算。
#[async_trait]
pub trait Enricher: Send + Sync {
    /// # Summary
    /// 对一根刚收盘的 K 线执行指标计算、形态/阶段分析与信号融合。
    ///
    /// # Logic
    /// 1. 前置校验 `history.len() ≥ options.min_history`。
    /// 2. 在截止时限内依次计算各指标类别 (可命中缓存)。
    /// 3. 运行形态、阶段、支撑/阻力分析。
    /// 4. 加权融合信号并钳制置信度。
    ///
    /// # Arguments
    /// * `current`: 刚收盘的 K 线。
    /// * `history`: 同键最近历史 (含 `current` 之前的根)。
    /// * `options`: 截止时限与降级策略。
    ///
    /// # Returns
    /// 成功返回富化制品；历史不足或超时返回 EnrichError。
    async fn enrich(
        &self,
        current: &Candle,
        history: &[Candle],
        options: &EnrichOptions,
    ) -> Result<EnrichedCandle, EnrichError>;
}
