use super::effective_period;
use rosoku_core::enrich::entity::{MomentumIndicators, MomentumState};
use rosoku_core::market::entity::Candle;

// 超买超卖阈值: RSI {70, 30}、随机指标 {80, 20}、威廉 %R {-20, -80}
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;
const STOCH_OVERBOUGHT: f64 = 80.0;
const STOCH_OVERSOLD: f64 = 20.0;
const WILLIAMS_OVERBOUGHT: f64 = -20.0;
const WILLIAMS_OVERSOLD: f64 = -80.0;

/// # Summary
/// RSI (Wilder 平滑)。返回序列末位值。
///
/// # Logic
/// 1. 拆分逐期涨跌幅为 gain/loss 序列。
/// 2. 初始均值取前 `period` 期 SMA，其后按
///    `avg = (avg·(n−1) + x) / n` 平滑。
/// 3. 全跌期 (avg_loss = 0) 时 RSI = 100。
fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 || period == 0 {
        return None;
    }

    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    gains.push(0.0);
    losses.push(0.0);
    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(-change);
        }
    }

    let mut avg_gain: f64 = gains[1..=period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[1..=period].iter().sum::<f64>() / period as f64;

    for i in (period + 1)..closes.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// 指定位置结尾的 %K：`(C − LL) / (HH − LL) · 100`，区间平盘时取 50
fn stoch_k_at(candles: &[Candle], end: usize, period: usize) -> f64 {
    let start = end.saturating_sub(period - 1);
    let slice = &candles[start..=end];
    let highest = slice.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = slice.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if highest == lowest {
        return 50.0;
    }
    (candles[end].close - lowest) / (highest - lowest) * 100.0
}

/// # Summary
/// 计算动量类指标：RSI14、随机指标 %K/%D (14/3)、威廉 %R (14)。
///
/// # Logic
/// 1. 数据不足名义周期时收缩周期。
/// 2. %D 取最近三个 %K 的均值。
/// 3. 状态判定按三个指标投票：任意两个超买 (超卖) 票成立即
///    判超买 (超卖)，否则中性。
/// 4. 强度取 RSI 偏离中轴的归一化幅度。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序，含当前根)。
///
/// # Returns
/// 窗口不足 2 根时返回 None。
pub fn compute(candles: &[Candle]) -> Option<MomentumIndicators> {
    if candles.len() < 2 {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let rsi_period = effective_period(14, closes.len() - 1);
    let rsi_14 = rsi(&closes, rsi_period)?;

    let stoch_period = effective_period(14, candles.len());
    let last = candles.len() - 1;
    let stoch_k = stoch_k_at(candles, last, stoch_period);
    let mut k_values = vec![stoch_k];
    if last >= 1 {
        k_values.push(stoch_k_at(candles, last - 1, stoch_period));
    }
    if last >= 2 {
        k_values.push(stoch_k_at(candles, last - 2, stoch_period));
    }
    let stoch_d = k_values.iter().sum::<f64>() / k_values.len() as f64;

    // 威廉 %R 与 %K 共用极值区间，镜像到 [-100, 0]
    let start = last.saturating_sub(stoch_period - 1);
    let slice = &candles[start..=last];
    let highest = slice.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = slice.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let williams_r = if highest == lowest {
        -50.0
    } else {
        -100.0 * (highest - closes[last]) / (highest - lowest)
    };

    let overbought_votes = u32::from(rsi_14 > RSI_OVERBOUGHT)
        + u32::from(stoch_k > STOCH_OVERBOUGHT)
        + u32::from(williams_r > WILLIAMS_OVERBOUGHT);
    let oversold_votes = u32::from(rsi_14 < RSI_OVERSOLD)
        + u32::from(stoch_k < STOCH_OVERSOLD)
        + u32::from(williams_r < WILLIAMS_OVERSOLD);

    let state = if overbought_votes >= 2 {
        MomentumState::Overbought
    } else if oversold_votes >= 2 {
        MomentumState::Oversold
    } else {
        MomentumState::Neutral
    };

    let strength = ((rsi_14 - 50.0).abs() / 50.0).clamp(0.0, 1.0);

    Some(MomentumIndicators {
        rsi_14,
        stoch_k,
        stoch_d,
        williams_r,
        state,
        strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rosoku_core::common::TimeFrame;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                symbol: "AAPL".to_string(),
                timeframe: TimeFrame::Minute1,
                time: chrono::Utc
                    .with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
                    .unwrap()
                    + chrono::Duration::minutes(i as i64),
                open: *close,
                high: close + 0.5,
                low: close - 0.5,
                close: *close,
                volume: 100,
            })
            .collect()
    }

    #[test]
    fn test_rsi_saturates_at_100_on_pure_gains() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_midpoint_on_alternating_series() {
        // 等幅涨跌交替：平均涨跌相等，RSI 逼近 50
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 50.0).abs() < 10.0, "rsi {} far from midpoint", value);
    }

    #[test]
    fn test_overbought_state_on_strong_rally() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 2.0).collect();
        let momentum = compute(&candles_from_closes(&closes)).unwrap();
        assert_eq!(momentum.state, MomentumState::Overbought);
        assert!(momentum.stoch_k > 80.0);
        assert!(momentum.williams_r > -20.0);
    }

    #[test]
    fn test_oversold_state_on_selloff() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64 * 2.0).collect();
        let momentum = compute(&candles_from_closes(&closes)).unwrap();
        assert_eq!(momentum.state, MomentumState::Oversold);
    }

    #[test]
    fn test_williams_range() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 * 0.9).sin()).collect();
        let momentum = compute(&candles_from_closes(&closes)).unwrap();
        assert!(momentum.williams_r <= 0.0);
        assert!(momentum.williams_r >= -100.0);
    }
}
