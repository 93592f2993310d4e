use super::effective_period;
use rosoku_core::enrich::entity::VolumeIndicators;
use rosoku_core::market::entity::Candle;

/// # Summary
/// 计算量能类指标：VWAP、OBV、20 期量均线与积累/派发线。
///
/// # Logic
/// 1. VWAP 按典型价 `(H+L+C)/3` 对全窗口成交量加权。
/// 2. OBV 按收盘方向累计符号成交量。
/// 3. A/D 线使用资金流乘数 `((C−L)−(H−C))/(H−L)`，H=L 的
///    平盘根跳过。
/// 4. 量能确认：OBV 符号与窗口首尾价差方向一致视为确认。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序，含当前根)。
///
/// # Returns
/// 窗口为空或总成交量为零时返回 None。
pub fn compute(candles: &[Candle]) -> Option<VolumeIndicators> {
    if candles.is_empty() {
        return None;
    }

    let total_volume: f64 = candles.iter().map(|c| c.volume as f64).sum();
    if total_volume <= 0.0 {
        return None;
    }

    let weighted: f64 = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0 * c.volume as f64)
        .sum();
    let vwap = weighted / total_volume;

    let mut obv = 0.0;
    for pair in candles.windows(2) {
        let volume = pair[1].volume as f64;
        if pair[1].close > pair[0].close {
            obv += volume;
        } else if pair[1].close < pair[0].close {
            obv -= volume;
        }
    }

    let ma_period = effective_period(20, candles.len());
    let volume_ma_20 = candles[candles.len() - ma_period..]
        .iter()
        .map(|c| c.volume as f64)
        .sum::<f64>()
        / ma_period as f64;

    let mut ad_line = 0.0;
    for c in candles {
        let range = c.high - c.low;
        if range <= 0.0 {
            continue;
        }
        let multiplier = ((c.close - c.low) - (c.high - c.close)) / range;
        ad_line += multiplier * c.volume as f64;
    }

    let price_change = candles[candles.len() - 1].close - candles[0].close;
    let confirms_price = if price_change == 0.0 || obv == 0.0 {
        false
    } else {
        price_change.signum() == obv.signum()
    };

    Some(VolumeIndicators {
        vwap,
        obv,
        volume_ma_20,
        ad_line,
        confirms_price,
    })
}
