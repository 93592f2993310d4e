use crate::common::TimeFrame;
use crate::market::entity::Candle;
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// K 线持久化接口 (Port)。流水线视角下为尽力而为的单写入汇点。
///
/// # Invariants
/// - `(symbol, timeframe, time)` 唯一；重复写入为幂等覆盖 (upsert)。
/// - 实现不得无限阻塞调用方。
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// # Summary
    /// 批量写入已收盘 K 线。
    ///
    /// # Logic
    /// 1. 在单个事务中逐根执行 upsert。
    /// 2. 任意一根失败则整批回滚并返回错误。
    ///
    /// # Arguments
    /// * `candles`: 待写入的 K 线批次。
    ///
    /// # Returns
    /// 成功返回 Ok，失败返回 StoreError。
    async fn insert_candles(&self, candles: &[Candle]) -> Result<(), StoreError>;

    /// # Summary
    /// 读取指定键在时间区间内的历史 K 线，按时间升序。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `timeframe`: K 线周期。
    /// * `start`: 区间起点 (含)。
    /// * `end`: 区间终点 (含)。
    ///
    /// # Returns
    /// 成功返回 K 线列表。
    async fn load_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError>;
}
