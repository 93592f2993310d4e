use rosoku_core::enrich::entity::{
    CandlePattern, ChartPattern, ChartPatternKind, PatternKind, TrendDirection,
};
use rosoku_core::market::entity::Candle;

// 实体占整根振幅的比例阈值：小于该值视为十字星
const DOJI_BODY_RATIO: f64 = 0.1;
// 影线与实体的倍数阈值：锤子线/流星线
const SHADOW_BODY_RATIO: f64 = 2.0;

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> f64 {
    c.high - c.low
}

fn upper_shadow(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_shadow(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

fn is_bullish(c: &Candle) -> bool {
    c.close > c.open
}

/// # Summary
/// 扫描最近 ≤5 根 K 线的蜡烛形态。
///
/// # Logic
/// 1. 单根形态 (十字星/锤子/流星) 只看最后一根。
/// 2. 双根形态 (吞没/孕线) 看最后两根。
/// 3. 识别结果按可信度降序返回。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序)；只取尾部最多 5 根。
///
/// # Returns
/// 已识别形态列表，可能为空。
pub fn scan(candles: &[Candle]) -> Vec<CandlePattern> {
    let tail = &candles[candles.len().saturating_sub(5)..];
    let Some(last) = tail.last() else {
        return vec![];
    };

    let mut patterns = Vec::new();
    let last_range = range(last);

    if last_range > 0.0 {
        let body_ratio = body(last) / last_range;

        if body_ratio < DOJI_BODY_RATIO {
            patterns.push(CandlePattern {
                kind: PatternKind::Doji,
                direction: TrendDirection::Neutral,
                reliability: 0.5,
            });
        }

        if body(last) > 0.0 {
            // 锤子线：长下影、短上影
            if lower_shadow(last) >= SHADOW_BODY_RATIO * body(last)
                && upper_shadow(last) <= body(last)
            {
                patterns.push(CandlePattern {
                    kind: PatternKind::Hammer,
                    direction: TrendDirection::Bullish,
                    reliability: 0.6,
                });
            }
            // 流星线：长上影、短下影
            if upper_shadow(last) >= SHADOW_BODY_RATIO * body(last)
                && lower_shadow(last) <= body(last)
            {
                patterns.push(CandlePattern {
                    kind: PatternKind::ShootingStar,
                    direction: TrendDirection::Bearish,
                    reliability: 0.6,
                });
            }
        }
    }

    if tail.len() >= 2 {
        let prev = &tail[tail.len() - 2];

        // 吞没：实体方向反转且完整覆盖前一根实体
        if is_bullish(last)
            && !is_bullish(prev)
            && last.open <= prev.close
            && last.close >= prev.open
            && body(last) > body(prev)
        {
            patterns.push(CandlePattern {
                kind: PatternKind::BullishEngulfing,
                direction: TrendDirection::Bullish,
                reliability: 0.7,
            });
        }
        if !is_bullish(last)
            && is_bullish(prev)
            && last.open >= prev.close
            && last.close <= prev.open
            && body(last) > body(prev)
        {
            patterns.push(CandlePattern {
                kind: PatternKind::BearishEngulfing,
                direction: TrendDirection::Bearish,
                reliability: 0.7,
            });
        }

        // 孕线：小实体完全处于前一根大实体之内
        let prev_body_high = prev.open.max(prev.close);
        let prev_body_low = prev.open.min(prev.close);
        let last_body_high = last.open.max(last.close);
        let last_body_low = last.open.min(last.close);
        if body(prev) > 0.0
            && body(last) < body(prev) * 0.6
            && last_body_high < prev_body_high
            && last_body_low > prev_body_low
        {
            let (kind, direction) = if !is_bullish(prev) {
                (PatternKind::BullishHarami, TrendDirection::Bullish)
            } else {
                (PatternKind::BearishHarami, TrendDirection::Bearish)
            };
            patterns.push(CandlePattern {
                kind,
                direction,
                reliability: 0.55,
            });
        }
    }

    patterns.sort_by(|a, b| {
        b.reliability
            .partial_cmp(&a.reliability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    patterns
}

/// # Summary
/// 扫描窗口级图表形态 (三角形、头肩顶、双顶/双底)。
/// 纯启发式、仅作咨询，可由配置整体关闭。
///
/// # Logic
/// 1. 提取摆动高/低点 (两侧各两根确认)。
/// 2. 双顶/双底：相邻两个同向摆动点价差 <0.5% 且中间有反向回撤。
/// 3. 头肩顶：三个摆动高点，中间高于两肩且两肩接近。
/// 4. 三角形：窗口后半段高点走低且低点走高 (收敛)。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序)。
///
/// # Returns
/// 已识别形态列表，可能为空。
pub fn scan_chart(candles: &[Candle]) -> Vec<ChartPattern> {
    if candles.len() < 20 {
        return vec![];
    }
    let mut found = Vec::new();

    let swing_highs = swing_points(candles, true);
    let swing_lows = swing_points(candles, false);

    // 双顶：最后两个摆动高点几乎等价
    if let [.., (_, a), (_, b)] = swing_highs.as_slice()
        && (a - b).abs() / a.max(*b) < 0.005
    {
        found.push(ChartPattern {
            kind: ChartPatternKind::DoubleTop,
            direction: TrendDirection::Bearish,
            reliability: 0.5,
        });
    }
    // 双底：最后两个摆动低点几乎等价
    if let [.., (_, a), (_, b)] = swing_lows.as_slice()
        && (a - b).abs() / a.max(*b) < 0.005
    {
        found.push(ChartPattern {
            kind: ChartPatternKind::DoubleBottom,
            direction: TrendDirection::Bullish,
            reliability: 0.5,
        });
    }

    // 头肩顶：中峰显著高于两肩、两肩接近
    if let [.., (_, left), (_, head), (_, right)] = swing_highs.as_slice()
        && head > left
        && head > right
        && (left - right).abs() / left.max(*right) < 0.01
        && (head - left.max(*right)) / head > 0.005
    {
        found.push(ChartPattern {
            kind: ChartPatternKind::HeadAndShoulders,
            direction: TrendDirection::Bearish,
            reliability: 0.45,
        });
    }

    // 三角形收敛：后半窗口的极值区间显著窄于前半
    let mid = candles.len() / 2;
    let first_range = half_range(&candles[..mid]);
    let second_range = half_range(&candles[mid..]);
    if second_range > 0.0 && second_range < first_range * 0.6 {
        found.push(ChartPattern {
            kind: ChartPatternKind::Triangle,
            direction: TrendDirection::Neutral,
            reliability: 0.4,
        });
    }

    found
}

/// 提取摆动点：两侧各 2 根确认的局部极值，返回 (索引, 价格)。
/// 紧邻两根要求严格不等，排除平台段的伪极值。
pub(crate) fn swing_points(candles: &[Candle], highs: bool) -> Vec<(usize, f64)> {
    let mut points = Vec::new();
    if candles.len() < 5 {
        return points;
    }
    let pick = |j: usize| {
        if highs {
            candles[j].high
        } else {
            candles[j].low
        }
    };
    for i in 2..candles.len() - 2 {
        let value = pick(i);
        let strict = if highs {
            value > pick(i - 1) && value > pick(i + 1)
        } else {
            value < pick(i - 1) && value < pick(i + 1)
        };
        let loose = if highs {
            value >= pick(i - 2) && value >= pick(i + 2)
        } else {
            value <= pick(i - 2) && value <= pick(i + 2)
        };
        if strict && loose {
            points.push((i, value));
        }
    }
    points
}

fn half_range(candles: &[Candle]) -> f64 {
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    high - low
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rosoku_core::common::TimeFrame;

    fn candle(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "AAPL".to_string(),
            timeframe: TimeFrame::Minute1,
            time: chrono::Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
                + chrono::Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
            volume: 100,
        }
    }

    #[test]
    fn test_doji_detected() {
        let candles = vec![candle(0, 100.0, 101.0, 99.0, 100.05)];
        let patterns = scan(&candles);
        assert!(patterns.iter().any(|p| p.kind == PatternKind::Doji));
    }

    #[test]
    fn test_hammer_detected() {
        // 长下影、小实体、几乎无上影
        let candles = vec![candle(0, 100.0, 100.3, 97.0, 100.2)];
        let patterns = scan(&candles);
        assert!(patterns.iter().any(|p| p.kind == PatternKind::Hammer));
    }

    #[test]
    fn test_bullish_engulfing_detected() {
        let candles = vec![
            candle(0, 101.0, 101.5, 99.5, 100.0),
            candle(1, 99.8, 102.5, 99.5, 102.0),
        ];
        let patterns = scan(&candles);
        assert!(
            patterns
                .iter()
                .any(|p| p.kind == PatternKind::BullishEngulfing)
        );
    }

    #[test]
    fn test_plain_candle_yields_nothing() {
        // 中等实体、对称小影线：不命中任何形态
        let candles = vec![
            candle(0, 100.0, 101.2, 99.4, 101.0),
            candle(1, 101.0, 102.2, 100.4, 102.0),
        ];
        assert!(scan(&candles).is_empty());
    }

    #[test]
    fn test_double_top_detected() {
        // 两个几乎等高的峰，其余缓慢爬升不构成摆动点
        let mut candles = Vec::new();
        for i in 0..30usize {
            let price = match i {
                8 => 110.0,
                22 => 110.2,
                _ => 100.0 + i as f64 * 0.01,
            };
            candles.push(candle(i, price - 0.2, price, price - 0.5, price - 0.1));
        }
        let found = scan_chart(&candles);
        assert!(
            found
                .iter()
                .any(|p| p.kind == ChartPatternKind::DoubleTop)
        );
    }

    #[test]
    fn test_short_window_has_no_chart_patterns() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 100.0, 101.0, 99.0, 100.5)).collect();
        assert!(scan_chart(&candles).is_empty());
    }
}
