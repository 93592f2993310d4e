use futures::StreamExt;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::feed::entity::MarketEvent;
use rosoku_core::feed::port::EventStream;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// # Summary
/// 将有界广播环的读取端包装为归一化事件流。
///
/// # Logic
/// 1. 挂载 `BroadcastStream` 读取端。
/// 2. 读取端落后导致最旧事件被覆盖时，按被覆盖数量递增
///    `feed_dropped` 计数并继续消费。
/// 3. 发送端全部关闭时流自然终止。
///
/// # Arguments
/// * `rx`: 广播读取端。
/// * `counters`: 全局流水线计数器。
///
/// # Returns
/// 动态分发的事件流。
pub(crate) fn wrap_output(
    rx: broadcast::Receiver<MarketEvent>,
    counters: Arc<PipelineCounters>,
) -> EventStream {
    let stream = BroadcastStream::new(rx).filter_map(move |item| {
        let counters = counters.clone();
        async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!("Feed output overflow, {} oldest events overwritten", n);
                    PipelineCounters::add(&counters.feed_dropped, n);
                    None
                }
            }
        }
    });
    Box::pin(stream)
}
