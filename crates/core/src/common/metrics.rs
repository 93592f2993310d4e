use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// # Summary
/// 流水线全局丢弃/吞吐计数器，贯穿所有背压边界。
/// 每个有界通道在溢出时只递增对应计数器，绝不阻塞生产者。
///
/// # Invariants
/// - 所有计数单调递增，进程生命周期内不归零。
/// - 读写均为 Relaxed 原子操作，不参与任何同步协议。
#[derive(Debug, Default)]
pub struct PipelineCounters {
    // 行情源输出环溢出，被覆盖的最旧事件数
    pub feed_dropped: AtomicU64,
    // 路由器投递时聚合器收件箱已满而丢弃的事件数
    pub agg_input_dropped: AtomicU64,
    // 聚合器完成 K 线因下游通道满而丢弃的根数 (最高严重级)
    pub candle_dropped: AtomicU64,
    // 富化产物因广播通道满而丢弃的条数
    pub broadcast_dropped: AtomicU64,
    // 因出站队列溢出被强制剔除的慢客户端数
    pub slow_client_evicted: AtomicU64,
    // 持久化 fork 通道已满，未能入队汇点的 K 线根数
    pub persist_channel_dropped: AtomicU64,
    // 汇点写库最终失败（重试耗尽后的永久错误）的 K 线根数
    pub persist_failed: AtomicU64,
    // 已向客户端投递成功的消息总数
    pub messages_sent: AtomicU64,
}

/// # Summary
/// 计数器的一次性只读快照，供状态接口序列化输出。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub feed_dropped: u64,
    pub agg_input_dropped: u64,
    pub candle_dropped: u64,
    pub broadcast_dropped: u64,
    pub slow_client_evicted: u64,
    pub persist_channel_dropped: u64,
    pub persist_failed: u64,
    pub messages_sent: u64,
}

impl PipelineCounters {
    /// # Summary
    /// 递增指定计数器。内联小工具，避免调用方散落 Ordering 细节。
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// # Summary
    /// 按给定数量递增指定计数器。
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// # Summary
    /// 生成当前时刻的只读快照。
    ///
    /// # Returns
    /// 各计数器的瞬时值集合。
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            feed_dropped: self.feed_dropped.load(Ordering::Relaxed),
            agg_input_dropped: self.agg_input_dropped.load(Ordering::Relaxed),
            candle_dropped: self.candle_dropped.load(Ordering::Relaxed),
            broadcast_dropped: self.broadcast_dropped.load(Ordering::Relaxed),
            slow_client_evicted: self.slow_client_evicted.load(Ordering::Relaxed),
            persist_channel_dropped: self.persist_channel_dropped.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_snapshot() {
        let counters = PipelineCounters::default();
        PipelineCounters::incr(&counters.feed_dropped);
        PipelineCounters::add(&counters.messages_sent, 5);

        let snap = counters.snapshot();
        assert_eq!(snap.feed_dropped, 1);
        assert_eq!(snap.messages_sent, 5);
        assert_eq!(snap.candle_dropped, 0);
        assert_eq!(snap.persist_channel_dropped, 0);
    }
}
