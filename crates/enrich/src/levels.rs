use crate::patterns::swing_points;
use rosoku_core::enrich::entity::{LevelKind, PriceLevel};
use rosoku_core::market::entity::Candle;

// 同一价位带的聚类容差 (相对价格)
const CLUSTER_TOLERANCE: f64 = 0.005;
// 单侧最多保留的级别数
const MAX_LEVELS_PER_SIDE: usize = 5;

/// # Summary
/// 支撑/阻力级别探测：摆动高/低点按价位带聚类。
///
/// # Logic
/// 1. 提取两侧各 2 根确认的摆动高点与低点。
/// 2. 价差在 ±0.5% 容差内的摆动点并入同一价位带。
/// 3. 每个价位带产出一条级别：价格取带内均值，触及次数即
///    带内点数，强度随触及次数线性增长 (5 次封顶)。
/// 4. 两侧各按强度降序保留至多 5 条。
///
/// # Arguments
/// * `candles`: K 线窗口 (时间升序)。
///
/// # Returns
/// 级别列表，按强度降序；窗口过短时为空。
pub fn detect(candles: &[Candle]) -> Vec<PriceLevel> {
    let mut levels = Vec::new();
    levels.extend(cluster(
        swing_points(candles, true),
        LevelKind::Resistance,
    ));
    levels.extend(cluster(swing_points(candles, false), LevelKind::Support));
    levels.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    levels
}

/// # Summary
/// 将一侧的摆动点聚类为价位带。
///
/// # Logic
/// 1. 摆动点按价格升序排列。
/// 2. 顺序扫描：与当前带均值的相对偏差在容差内则并入，
///    否则封闭当前带并另起新带。
fn cluster(mut points: Vec<(usize, f64)>, kind: LevelKind) -> Vec<PriceLevel> {
    if points.is_empty() {
        return vec![];
    }
    points.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut bands: Vec<Vec<f64>> = Vec::new();
    for (_, price) in points {
        match bands.last_mut() {
            Some(band) => {
                let mean = band.iter().sum::<f64>() / band.len() as f64;
                if mean > 0.0 && ((price - mean) / mean).abs() <= CLUSTER_TOLERANCE {
                    band.push(price);
                } else {
                    bands.push(vec![price]);
                }
            }
            None => bands.push(vec![price]),
        }
    }

    let mut levels: Vec<PriceLevel> = bands
        .into_iter()
        .map(|band| {
            let touches = band.len() as u32;
            PriceLevel {
                kind,
                price: band.iter().sum::<f64>() / band.len() as f64,
                strength: (f64::from(touches.min(5))) / 5.0,
                touches,
            }
        })
        .collect();

    levels.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    levels.truncate(MAX_LEVELS_PER_SIDE);
    levels
}
