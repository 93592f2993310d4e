pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

/// # Summary
/// 简单移动平均序列。前 `period - 1` 个位置以 NaN 填充。
///
/// # Logic
/// 滑动累加：首个窗口求和后，每步加新值减旧值。
pub(crate) fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if data.is_empty() || period == 0 || period > data.len() {
        return vec![f64::NAN; data.len()];
    }

    let mut result = vec![f64::NAN; data.len()];
    let mut sum: f64 = data[..period].iter().sum();
    result[period - 1] = sum / period as f64;

    for i in period..data.len() {
        sum += data[i] - data[i - period];
        result[i] = sum / period as f64;
    }

    result
}

/// # Summary
/// 指数移动平均序列，平滑系数 `α = 2/(period+1)`。
/// 首个有效值以前 `period` 个数据的 SMA 播种。
pub(crate) fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if data.is_empty() || period == 0 || period > data.len() {
        return vec![f64::NAN; data.len()];
    }

    let mut result = vec![f64::NAN; data.len()];
    let multiplier = 2.0 / (period as f64 + 1.0);

    let initial_sma: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = initial_sma;

    for i in period..data.len() {
        let prev = result[i - 1];
        result[i] = (data[i] - prev) * multiplier + prev;
    }

    result
}

/// 取序列末位有效值；序列为空或末位为 NaN 时返回 None
pub(crate) fn last_valid(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| v.is_finite())
}

/// 数据不足时收缩周期：取 `min(period, len)`，保证指标总能给出确定值
pub(crate) fn effective_period(period: usize, len: usize) -> usize {
    period.min(len).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_known_series() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let series = sma(&data, 3);
        assert!(series[0].is_nan());
        assert!(series[1].is_nan());
        assert_eq!(series[2], 2.0);
        assert_eq!(series[3], 3.0);
        assert_eq!(series[4], 4.0);
    }

    #[test]
    fn test_ema_seeded_by_sma() {
        let data = [2.0, 4.0, 6.0, 8.0];
        let series = ema(&data, 3);
        // 种子 = 前三个的 SMA = 4.0；α = 0.5
        assert_eq!(series[2], 4.0);
        assert_eq!(series[3], (8.0 - 4.0) * 0.5 + 4.0);
    }

    #[test]
    fn test_sma_period_exceeding_len_is_all_nan() {
        let data = [1.0, 2.0];
        assert!(sma(&data, 3).iter().all(|v| v.is_nan()));
    }
}
