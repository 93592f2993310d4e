use crate::common::TimeFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根已收盘 K 线实体，聚合器在桶边界产出的冻结快照。
///
/// # Invariants
/// - `low ≤ min(open, close)` 且 `max(open, close) ≤ high`。
/// - `volume ≥ 0`。
/// - `time` 必须对齐到 `timeframe` 的 UTC 栅格。
/// - 产出后不可变；同一 (symbol, timeframe, time) 至多产出一次。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    // 证券代码
    pub symbol: String,
    // K 线周期
    pub timeframe: TimeFrame,
    // 桶起始时间 (栅格对齐)
    pub time: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: i64,
}

impl Candle {
    /// # Summary
    /// 校验 OHLCV 不变量。
    ///
    /// # Logic
    /// 1. 检查 `low ≤ min(open, close)` 与 `max(open, close) ≤ high`。
    /// 2. 检查成交量非负。
    /// 3. 检查 `time` 栅格对齐。
    ///
    /// # Returns
    /// 全部满足返回 Ok，否则返回首个违反项的描述。
    pub fn validate(&self) -> Result<(), String> {
        if self.low > self.open.min(self.close) {
            return Err(format!(
                "low {} exceeds min(open, close) {}",
                self.low,
                self.open.min(self.close)
            ));
        }
        if self.high < self.open.max(self.close) {
            return Err(format!(
                "high {} below max(open, close) {}",
                self.high,
                self.open.max(self.close)
            ));
        }
        if self.volume < 0 {
            return Err(format!("volume {} is negative", self.volume));
        }
        if self.timeframe.bucket_start(self.time) != self.time {
            return Err(format!(
                "time {} is not aligned to the {} grid",
                self.time, self.timeframe
            ));
        }
        Ok(())
    }
}
