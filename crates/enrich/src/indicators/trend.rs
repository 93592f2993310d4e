use super::{effective_period, ema, last_valid, sma};
use rosoku_core::enrich::entity::{TrendDirection, TrendIndicators};

/// # Summary
/// 计算趋势类指标：SMA20/50、EMA12/26、MACD 族与方向判定。
///
/// # Logic
/// 1. 数据不足名义周期时按可用长度收缩周期，保证给出确定值。
/// 2. MACD = EMA12 − EMA26；signal = MACD 序列的 9 期 EMA；
///    histogram = MACD − signal。
/// 3. 价格 > SMA20 > SMA50 且 MACD > 0 判看多；完全反向判看空；
///    其余中性。
/// 4. 强度取价格偏离 SMA20 幅度与 MACD 柱相对幅度的合成，
///    钳制到 [0, 1]。
///
/// # Arguments
/// * `closes`: 收盘价序列 (时间升序，含当前根)。
///
/// # Returns
/// 序列为空时返回 None，否则返回完整趋势指标。
pub fn compute(closes: &[f64]) -> Option<TrendIndicators> {
    if closes.is_empty() {
        return None;
    }
    let len = closes.len();
    let price = *closes.last()?;

    let sma_20 = last_valid(&sma(closes, effective_period(20, len)))?;
    let sma_50 = last_valid(&sma(closes, effective_period(50, len)))?;

    let ema_12_series = ema(closes, effective_period(12, len));
    let ema_26_series = ema(closes, effective_period(26, len));
    let ema_12 = last_valid(&ema_12_series)?;
    let ema_26 = last_valid(&ema_26_series)?;

    // MACD 序列：逐位 EMA12 − EMA26 (NaN 传染由 last_valid 兜底)
    let macd_series: Vec<f64> = ema_12_series
        .iter()
        .zip(ema_26_series.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();
    let valid_macd: Vec<f64> = macd_series.iter().copied().filter(|v| v.is_finite()).collect();
    let macd = *valid_macd.last()?;
    let macd_signal =
        last_valid(&ema(&valid_macd, effective_period(9, valid_macd.len()))).unwrap_or(macd);
    let macd_histogram = macd - macd_signal;

    let direction = if price > sma_20 && sma_20 > sma_50 && macd > 0.0 {
        TrendDirection::Bullish
    } else if price < sma_20 && sma_20 < sma_50 && macd < 0.0 {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    let deviation = ((price - sma_20) / sma_20).abs();
    let histogram_ratio = if price > 0.0 {
        (macd_histogram / price).abs()
    } else {
        0.0
    };
    let strength = (deviation * 20.0 + histogram_ratio * 100.0).clamp(0.0, 1.0);

    Some(TrendIndicators {
        sma_20,
        sma_50,
        ema_12,
        ema_26,
        macd,
        macd_signal,
        macd_histogram,
        direction,
        strength,
    })
}
