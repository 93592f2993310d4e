use super::{effective_period, last_valid, sma};
use rosoku_core::enrich::entity::{VolatilityIndicators, VolatilityLevel};
use rosoku_core::market::entity::Candle;

// 波动分级阈值：ATR 占收盘价百分比
const LOW_ATR_PERCENT: f64 = 1.0;
const HIGH_ATR_PERCENT: f64 = 3.0;

/// # Summary
/// 真实波幅序列：`TR = max(H−L, |H−prevC|, |L−prevC|)`。
/// 首根退化为 H−L。
pub(crate) fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                let prev_close = candles[i - 1].close;
                (c.high - c.low)
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            }
        })
        .collect()
}

/// # Summary
/// ATR (Wilder 平滑)：初值取前 `period` 期 TR 均值，
/// 其后 `atr = (atr·(n−1) + tr) / n`。
pub(crate) fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    let ranges = true_ranges(candles);
    if ranges.len() < period || period == 0 {
        return None;
    }
    let mut value: f64 = ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(value)
}

/// # Summary
/// 计算波动类指标：布林带 (20, 2σ) 与 ATR14。
///
/// # Logic
/// 1. 中轨取 SMA，上下轨偏移两倍总体标准差。
/// 2. ATR 百分比 <1% 判低波动，>3% 判高波动，其余正常。
/// 3. 数据不足名义周期时收缩周期。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序，含当前根)。
///
/// # Returns
/// 窗口为空或收盘价非正时返回 None。
pub fn compute(candles: &[Candle]) -> Option<VolatilityIndicators> {
    if candles.is_empty() {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let price = *closes.last()?;
    if price <= 0.0 {
        return None;
    }

    let bb_period = effective_period(20, closes.len());
    let middle = last_valid(&sma(&closes, bb_period))?;
    let window = &closes[closes.len() - bb_period..];
    let variance =
        window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / bb_period as f64;
    let std_dev = variance.sqrt();

    let atr_period = effective_period(14, candles.len());
    let atr_14 = atr(candles, atr_period)?;
    let atr_percent = atr_14 / price * 100.0;

    let level = if atr_percent < LOW_ATR_PERCENT {
        VolatilityLevel::Low
    } else if atr_percent > HIGH_ATR_PERCENT {
        VolatilityLevel::High
    } else {
        VolatilityLevel::Normal
    };

    Some(VolatilityIndicators {
        bollinger_upper: middle + 2.0 * std_dev,
        bollinger_middle: middle,
        bollinger_lower: middle - 2.0 * std_dev,
        atr_14,
        atr_percent,
        level,
    })
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
    fn test_true_range_uses_gap_to_previous_close() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            // 向上跳空：TR 必须覆盖 |H − prevC|
            candle(1, 105.0, 106.0, 104.5, 105.5),
        ];
        let ranges = true_ranges(&candles);
        assert_eq!(ranges[0], 2.0);
        assert_eq!(ranges[1], 6.0);
    }

    #[test]
    fn test_flat_market_is_low_volatility() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(i, 100.0, 100.1, 99.9, 100.0))
            .collect();
        let vol = compute(&candles).unwrap();
        assert_eq!(vol.level, VolatilityLevel::Low);
        assert!(vol.bollinger_upper >= vol.bollinger_middle);
        assert!(vol.bollinger_lower <= vol.bollinger_middle);
    }

    #[test]
    fn test_wild_market_is_high_volatility() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = if i % 2 == 0 { 100.0 } else { 108.0 };
                candle(i, base, base + 4.0, base - 4.0, base)
            })
            .collect();
        let vol = compute(&candles).unwrap();
        assert_eq!(vol.level, VolatilityLevel::High);
    }

    #[test]
    fn test_bands_widen_with_dispersion() {
        let calm: Vec<Candle> = (0..25)
            .map(|i| candle(i, 100.0, 100.2, 99.8, 100.0))
            .collect();
        let noisy: Vec<Candle> = (0..25)
            .map(|i| {
                let c = if i % 2 == 0 { 95.0 } else { 105.0 };
                candle(i, c, c + 1.0, c - 1.0, c)
            })
            .collect();

        let calm_width = {
            let v = compute(&calm).unwrap();
            v.bollinger_upper - v.bollinger_lower
        };
        let noisy_width = {
            let v = compute(&noisy).unwrap();
            v.bollinger_upper - v.bollinger_lower
        };
        assert!(noisy_width > calm_width);
    }
}
