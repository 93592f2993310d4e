use crate::indicators::volatility::true_ranges;
use rosoku_core::enrich::entity::MarketRegime;
use rosoku_core::market::entity::Candle;

// 趋势强度阈值：20 根窗口的收盘价变化率超过 ±2% 视为方向明确
const TREND_THRESHOLD: f64 = 0.02;
// 近期相对量阈值：10 根均量 / 30 根均量
const VOLUME_EXPANSION: f64 = 1.2;

/// # Summary
/// Wyckoff 风格阶段分类器。
///
/// # Logic
/// 1. 趋势强度：最近 20 根收盘价的相对变化率。
/// 2. 相对量能：最近 10 根均量对最近 30 根均量之比。
/// 3. ATR 扩张：窗口后半段 TR 均值对前半段之比。
/// 4. 规则：
///    - 趋势上行且 (量能或波幅扩张) → Markup；
///    - 趋势下行且 (量能或波幅扩张) → Markdown；
///    - 横盘 + 放量 + 价格处于窗口下半区 → Accumulation；
///    - 横盘 + 放量 + 价格处于窗口上半区 → Distribution；
///    - 其余按价格区位取 Accumulation / Distribution。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序，至少 20 根)。
///
/// # Returns
/// 窗口不足 20 根时返回 None。
pub fn classify(candles: &[Candle]) -> Option<MarketRegime> {
    if candles.len() < 20 {
        return None;
    }

    let tail20 = &candles[candles.len() - 20..];
    let first = tail20.first()?.close;
    let last = tail20.last()?.close;
    if first <= 0.0 {
        return None;
    }
    let trend = (last - first) / first;

    let mean_volume = |slice: &[Candle]| -> f64 {
        if slice.is_empty() {
            return 0.0;
        }
        slice.iter().map(|c| c.volume as f64).sum::<f64>() / slice.len() as f64
    };
    let recent = mean_volume(&candles[candles.len().saturating_sub(10)..]);
    let base = mean_volume(&candles[candles.len().saturating_sub(30)..]);
    let relative_volume = if base > 0.0 { recent / base } else { 1.0 };

    let ranges = true_ranges(candles);
    let mid = ranges.len() / 2;
    let early: f64 = ranges[..mid].iter().sum::<f64>() / mid.max(1) as f64;
    let late: f64 =
        ranges[mid..].iter().sum::<f64>() / (ranges.len() - mid).max(1) as f64;
    let atr_expanding = early > 0.0 && late / early > 1.1;

    let expansion = relative_volume > VOLUME_EXPANSION || atr_expanding;

    if trend > TREND_THRESHOLD && expansion {
        return Some(MarketRegime::Markup);
    }
    if trend < -TREND_THRESHOLD && expansion {
        return Some(MarketRegime::Markdown);
    }

    // 横盘：按价格在窗口区间的位置判定吸筹或派发
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let position = if high > low {
        (last - low) / (high - low)
    } else {
        0.5
    };

    if trend > TREND_THRESHOLD {
        Some(MarketRegime::Markup)
    } else if trend < -TREND_THRESHOLD {
        Some(MarketRegime::Markdown)
    } else if position < 0.5 {
        Some(MarketRegime::Accumulation)
    } else {
        Some(MarketRegime::Distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rosoku_core::common::TimeFrame;

    fn candle(i: usize, close: f64, volume: i64) -> Candle {
        Candle {
            symbol: "AAPL".to_string(),
            timeframe: TimeFrame::Minute1,
            time: chrono::Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
                + chrono::Duration::minutes(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn test_strong_rally_is_markup() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| candle(i, 100.0 + i as f64, 500 + i as i64 * 40))
            .collect();
        assert_eq!(classify(&candles), Some(MarketRegime::Markup));
    }

    #[test]
    fn test_selloff_is_markdown() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| candle(i, 200.0 - i as f64 * 2.0, 500 + i as i64 * 40))
            .collect();
        assert_eq!(classify(&candles), Some(MarketRegime::Markdown));
    }

    #[test]
    fn test_flat_low_position_is_accumulation() {
        // 早期冲高后长期横盘在低位
        let mut candles: Vec<Candle> = vec![candle(0, 100.0, 500), candle(1, 120.0, 500)];
        for i in 2..40 {
            candles.push(candle(i, 100.0 + (i % 2) as f64 * 0.2, 500));
        }
        assert_eq!(classify(&candles), Some(MarketRegime::Accumulation));
    }

    #[test]
    fn test_insufficient_window() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 100.0, 500)).collect();
        assert_eq!(classify(&candles), None);
    }
}
