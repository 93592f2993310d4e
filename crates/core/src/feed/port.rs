use crate::feed::entity::{FeedStatus, MarketEvent};
use crate::feed::error::FeedError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// # Summary
/// 归一化行情事件流别名，使用动态分发的异步流。
pub type EventStream = Pin<Box<dyn Stream<Item = MarketEvent> + Send>>;

/// # Summary
/// 行情源适配器行为契约。实盘 WebSocket 客户端与合成发生器共用此接口。
///
/// # Invariants
/// - 事件按上游顺序产出，不得重排。
/// - 输出序列有界 (容量 10000)：溢出时覆盖最旧未读事件并计数，
///   下游不得假设无损。
/// - `subscribe` / `unsubscribe` 幂等，且在 `start` 前后均可调用；
///   重连成功后必须先重放当前订阅集再恢复产出。
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// # Summary
    /// 启动适配器。连接失败进入指数退避重连
    /// (基数 1s、倍率 2、上限 30s、抖动 ±20%)，直到 `stop`。
    ///
    /// # Returns
    /// 启动受理返回 Ok；鉴权配置缺失等致命问题返回 FeedError。
    async fn start(&self) -> Result<(), FeedError>;

    /// # Summary
    /// 停止适配器：断开连接、终止重连、关闭输出。
    async fn stop(&self);

    /// # Summary
    /// 将证券加入订阅集。已在集合中的代码为无操作。
    ///
    /// # Arguments
    /// * `symbols`: 证券代码列表。
    async fn subscribe(&self, symbols: &[String]) -> Result<(), FeedError>;

    /// # Summary
    /// 将证券移出订阅集。不在集合中的代码为无操作。
    ///
    /// # Arguments
    /// * `symbols`: 证券代码列表。
    async fn unsubscribe(&self, symbols: &[String]) -> Result<(), FeedError>;

    /// # Summary
    /// 获取归一化事件输出流。每次调用挂载一个新的读取端。
    ///
    /// # Returns
    /// 惰性异步事件流。
    fn output(&self) -> EventStream;

    /// # Summary
    /// 读取当前运行状态快照。
    ///
    /// # Returns
    /// 含连接状态、重连次数、丢弃计数的快照。
    fn status(&self) -> FeedStatus;
}
