use rosoku_core::enrich::entity::{
    CandlePattern, IndicatorVector, MomentumState, SignalDirection, SignalSummary, TrendDirection,
};

// 融合权重：趋势 40%、动量 35%、量能 25%
const TREND_WEIGHT: f64 = 0.40;
const MOMENTUM_WEIGHT: f64 = 0.35;
const VOLUME_WEIGHT: f64 = 0.25;
// 综合得分的中性死区
const NEUTRAL_BAND: f64 = 0.15;
// 置信度钳制区间
const CONFIDENCE_FLOOR: f64 = 20.0;
const CONFIDENCE_CEIL: f64 = 95.0;

/// # Summary
/// 加权融合各指标类别为单一交易信号。
///
/// # Logic
/// 1. 趋势得分：方向乘以强度 (±strength)。
/// 2. 动量得分：RSI 偏离中轴的归一化值，超买/超卖状态衰减
///    (顺势追高不加分)；%K 与 %D 的相对位置做 ±0.25 修正。
/// 3. 量能得分：量能确认时沿趋势方向加分，背离时反向扣分。
/// 4. 综合 = 0.40·趋势 + 0.35·动量 + 0.25·量能；
///    |综合| ≤ 0.15 判中性。
/// 5. 置信度 = 20 + 75 · (0.4·趋势强度 + 0.3·动量强度 +
///    0.15·量能确认 + 0.15·形态佐证)，钳制 [20, 95]。
///
/// # Arguments
/// * `indicators`: 已计算的指标向量 (允许部分类别缺省)。
/// * `patterns`: 已识别的蜡烛形态。
///
/// # Returns
/// 趋势与动量均缺省时返回 None (无法给出有意义的信号)。
pub fn fuse(indicators: &IndicatorVector, patterns: &[CandlePattern]) -> Option<SignalSummary> {
    if indicators.trend.is_none() && indicators.momentum.is_none() {
        return None;
    }

    let trend_score = indicators
        .trend
        .as_ref()
        .map(|t| match t.direction {
            TrendDirection::Bullish => t.strength,
            TrendDirection::Bearish => -t.strength,
            TrendDirection::Neutral => 0.0,
        })
        .unwrap_or(0.0);

    let momentum_score = indicators
        .momentum
        .as_ref()
        .map(|m| {
            let mut score = ((m.rsi_14 - 50.0) / 50.0).clamp(-1.0, 1.0);
            // 极端读数衰减：超买区看多动量减半，超卖区对称
            match m.state {
                MomentumState::Overbought if score > 0.0 => score *= 0.5,
                MomentumState::Oversold if score < 0.0 => score *= 0.5,
                _ => {}
            }
            score += if m.stoch_k >= m.stoch_d { 0.25 } else { -0.25 };
            score.clamp(-1.0, 1.0)
        })
        .unwrap_or(0.0);

    let volume_score = indicators
        .volume
        .as_ref()
        .map(|v| {
            let direction = if trend_score != 0.0 {
                trend_score.signum()
            } else if v.obv != 0.0 {
                v.obv.signum()
            } else {
                0.0
            };
            if v.confirms_price {
                direction * 0.8
            } else {
                -direction * 0.3
            }
        })
        .unwrap_or(0.0);

    let combined =
        TREND_WEIGHT * trend_score + MOMENTUM_WEIGHT * momentum_score + VOLUME_WEIGHT * volume_score;

    let overall = if combined > NEUTRAL_BAND {
        SignalDirection::Bullish
    } else if combined < -NEUTRAL_BAND {
        SignalDirection::Bearish
    } else {
        SignalDirection::Neutral
    };

    // 形态佐证：与综合方向一致的形态占比
    let pattern_agreement = if patterns.is_empty() {
        0.0
    } else {
        let agreeing = patterns
            .iter()
            .filter(|p| match overall {
                SignalDirection::Bullish => p.direction == TrendDirection::Bullish,
                SignalDirection::Bearish => p.direction == TrendDirection::Bearish,
                SignalDirection::Neutral => p.direction == TrendDirection::Neutral,
            })
            .count();
        agreeing as f64 / patterns.len() as f64
    };

    let trend_strength = indicators.trend.as_ref().map(|t| t.strength).unwrap_or(0.0);
    let momentum_strength = indicators
        .momentum
        .as_ref()
        .map(|m| m.strength)
        .unwrap_or(0.0);
    let volume_confirmation = indicators
        .volume
        .as_ref()
        .map(|v| if v.confirms_price { 1.0 } else { 0.0 })
        .unwrap_or(0.0);

    let confidence = (CONFIDENCE_FLOOR
        + 75.0
            * (0.4 * trend_strength
                + 0.3 * momentum_strength
                + 0.15 * volume_confirmation
                + 0.15 * pattern_agreement))
        .clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEIL);

    Some(SignalSummary {
        overall,
        magnitude: combined.abs().clamp(0.0, 1.0),
        confidence,
        trend_score,
        momentum_score,
        volume_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosoku_core::enrich::entity::{
        MomentumIndicators, PatternKind, TrendIndicators, VolumeIndicators,
    };

    fn trend(direction: TrendDirection, strength: f64) -> TrendIndicators {
        TrendIndicators {
            sma_20: 100.0,
            sma_50: 98.0,
            ema_12: 101.0,
            ema_26: 99.0,
            macd: 2.0,
            macd_signal: 1.5,
            macd_histogram: 0.5,
            direction,
            strength,
        }
    }

    fn momentum(rsi: f64) -> MomentumIndicators {
        MomentumIndicators {
            rsi_14: rsi,
            stoch_k: 60.0,
            stoch_d: 50.0,
            williams_r: -40.0,
            state: MomentumState::Neutral,
            strength: ((rsi - 50.0).abs() / 50.0).clamp(0.0, 1.0),
        }
    }

    fn volume(confirms: bool) -> VolumeIndicators {
        VolumeIndicators {
            vwap: 100.0,
            obv: 5_000.0,
            volume_ma_20: 800.0,
            ad_line: 2_000.0,
            confirms_price: confirms,
        }
    }

    #[test]
    fn test_aligned_inputs_produce_bullish_signal() {
        let indicators = IndicatorVector {
            trend: Some(trend(TrendDirection::Bullish, 0.8)),
            momentum: Some(momentum(65.0)),
            volatility: None,
            volume: Some(volume(true)),
        };
        let signal = fuse(&indicators, &[]).unwrap();
        assert_eq!(signal.overall, SignalDirection::Bullish);
        assert!(signal.magnitude > NEUTRAL_BAND);
    }

    #[test]
    fn test_confidence_clamped_to_band() {
        // 全强度输入也不得超过 95
        let indicators = IndicatorVector {
            trend: Some(trend(TrendDirection::Bullish, 1.0)),
            momentum: Some(momentum(100.0)),
            volatility: None,
            volume: Some(volume(true)),
        };
        let patterns = vec![CandlePattern {
            kind: PatternKind::BullishEngulfing,
            direction: TrendDirection::Bullish,
            reliability: 0.7,
        }];
        let signal = fuse(&indicators, &patterns).unwrap();
        assert!(signal.confidence <= CONFIDENCE_CEIL);
        assert!(signal.confidence >= CONFIDENCE_FLOOR);

        // 全零输入贴地板
        let weak = IndicatorVector {
            trend: Some(trend(TrendDirection::Neutral, 0.0)),
            momentum: Some(momentum(50.0)),
            volatility: None,
            volume: None,
        };
        let weak_signal = fuse(&weak, &[]).unwrap();
        assert!((weak_signal.confidence - CONFIDENCE_FLOOR).abs() < 10.0);
    }

    #[test]
    fn test_neutral_band_applies() {
        let indicators = IndicatorVector {
            trend: Some(trend(TrendDirection::Neutral, 0.0)),
            momentum: Some(momentum(51.0)),
            volatility: None,
            volume: None,
        };
        let signal = fuse(&indicators, &[]).unwrap();
        assert_eq!(signal.overall, SignalDirection::Neutral);
    }

    #[test]
    fn test_missing_all_categories_yields_none() {
        let indicators = IndicatorVector::default();
        assert!(fuse(&indicators, &[]).is_none());
    }

    #[test]
    fn test_deterministic() {
        let indicators = IndicatorVector {
            trend: Some(trend(TrendDirection::Bearish, 0.4)),
            momentum: Some(momentum(40.0)),
            volatility: None,
            volume: Some(volume(false)),
        };
        assert_eq!(fuse(&indicators, &[]), fuse(&indicators, &[]));
    }
}
