use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::market::entity::Candle;
use rosoku_core::store::error::StoreError;
use rosoku_core::store::port::CandleStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// 单批最多落库的根数
const BATCH_LIMIT: usize = 64;
// 短暂故障的重试上限与退避基数
const MAX_RETRIES: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(200);

/// # Summary
/// 尽力而为的持久化汇点。消费有界通道中的已收盘 K 线，
/// 批量写入 CandleStore。
///
/// # Invariants
/// - 绝不反压上游：上游以 try_send 投递，本汇点只决定落库节奏。
/// - 短暂故障重试 (指数退避，至多 3 次)；重试耗尽按批计入
///   `persist_failed` 后继续，不终止流水线。
/// - 停止信号到达后排空通道内剩余批次再退出。
pub struct PersistSink {
    store: Arc<dyn CandleStore>,
    rx: mpsc::Receiver<Candle>,
    counters: Arc<PipelineCounters>,
    token: CancellationToken,
}

impl PersistSink {
    /// # Summary
    /// 构造汇点。
    ///
    /// # Arguments
    /// * `store`: K 线存储实现。
    /// * `rx`: 有界通道接收端 (发送端由流水线 fork 持有)。
    /// * `counters`: 全局计数器。
    /// * `token`: 停止信号。
    pub fn new(
        store: Arc<dyn CandleStore>,
        rx: mpsc::Receiver<Candle>,
        counters: Arc<PipelineCounters>,
        token: CancellationToken,
    ) -> Self {
        Self {
            store,
            rx,
            counters,
            token,
        }
    }

    /// # Summary
    /// 汇点主循环。
    ///
    /// # Logic
    /// 1. 等待首根 K 线，随后非阻塞排空通道凑批 (至多 64 根)。
    /// 2. 整批写入，短暂故障退避重试。
    /// 3. 收到停止信号后排空剩余数据再退出。
    pub async fn run(mut self) {
        info!("Persist sink started");
        loop {
            let first = tokio::select! {
                _ = self.token.cancelled() => break,
                maybe = self.rx.recv() => match maybe {
                    Some(candle) => candle,
                    None => break,
                },
            };

            let mut batch = vec![first];
            while batch.len() < BATCH_LIMIT {
                match self.rx.try_recv() {
                    Ok(candle) => batch.push(candle),
                    Err(_) => break,
                }
            }
            self.write_batch(&batch).await;
        }

        // 排空：停止后不再等待新数据，但已入队的要落库
        let mut rest = Vec::new();
        while let Ok(candle) = self.rx.try_recv() {
            rest.push(candle);
            if rest.len() >= BATCH_LIMIT {
                self.write_batch(&rest).await;
                rest.clear();
            }
        }
        if !rest.is_empty() {
            self.write_batch(&rest).await;
        }
        info!("Persist sink exited");
    }

    /// # Summary
    /// 写入一批，短暂故障退避重试。
    ///
    /// # Logic
    /// 1. `Transient` 错误按 200ms·2^n 退避后重试，至多 3 次。
    /// 2. `Database` 等永久错误立即放弃。
    /// 3. 放弃时按批大小递增 `persist_failed`。
    async fn write_batch(&self, batch: &[Candle]) {
        let mut attempt: u32 = 0;
        loop {
            match self.store.insert_candles(batch).await {
                Ok(()) => {
                    debug!("Persisted {} candles", batch.len());
                    return;
                }
                Err(StoreError::Transient(msg)) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = RETRY_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "Transient store failure (attempt {}): {}, retrying in {:?}",
                        attempt, msg, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    PipelineCounters::add(&self.counters.persist_failed, batch.len() as u64);
                    error!("Persist batch of {} dropped: {}", batch.len(), e);
                    return;
                }
            }
        }
    }
}
