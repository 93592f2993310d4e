use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::market::entity::Candle;
use rosoku_enrich::service::EnrichmentService;
use rosoku_hub::hub::Artifact;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// # Summary
/// 流水线胶水协程：串行消费聚合器产出的已收盘 K 线，
/// 先 fork 到持久化，再广播原始 K 线，随后富化并广播制品。
///
/// # Invariants
/// - 单协程串行处理保证每个键的广播顺序与产出顺序一致。
/// - 所有下游投递均为 try_send：持久化 fork 通道溢出计
///   `persist_channel_dropped`，广播溢出计 `broadcast_dropped`，
///   绝不阻塞。写库本身的永久失败由汇点计入 `persist_failed`。
/// - 基础 K 线的广播先于且独立于富化结果。
pub struct PipelineTask {
    completed_rx: mpsc::Receiver<Candle>,
    persist_tx: mpsc::Sender<Candle>,
    artifact_tx: mpsc::Sender<Artifact>,
    // 控制面发来的证券移除通知
    invalidate_rx: mpsc::UnboundedReceiver<String>,
    service: EnrichmentService,
    counters: Arc<PipelineCounters>,
    token: CancellationToken,
}

impl PipelineTask {
    /// # Summary
    /// 构造流水线协程。
    pub fn new(
        completed_rx: mpsc::Receiver<Candle>,
        persist_tx: mpsc::Sender<Candle>,
        artifact_tx: mpsc::Sender<Artifact>,
        invalidate_rx: mpsc::UnboundedReceiver<String>,
        service: EnrichmentService,
        counters: Arc<PipelineCounters>,
        token: CancellationToken,
    ) -> Self {
        Self {
            completed_rx,
            persist_tx,
            artifact_tx,
            invalidate_rx,
            service,
            counters,
            token,
        }
    }

    /// # Summary
    /// 主循环：K 线处理与证券移除通知交织执行。
    pub async fn run(mut self) {
        info!("Pipeline task started");
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                maybe = self.completed_rx.recv() => match maybe {
                    Some(candle) => self.handle_candle(candle).await,
                    None => break,
                },
                maybe = self.invalidate_rx.recv() => {
                    if let Some(symbol) = maybe {
                        self.service.invalidate_symbol(&symbol).await;
                    }
                }
            }
        }
        info!("Pipeline task exited");
    }

    /// # Summary
    /// 处理一根已收盘 K 线。
    ///
    /// # Logic
    /// 1. fork 到持久化通道 (溢出只计数，与汇点的写库失败分账)。
    /// 2. 广播原始 K 线 (富化失败也不影响)。
    /// 3. 富化成功则再广播富化制品。
    async fn handle_candle(&mut self, candle: Candle) {
        if self.persist_tx.try_send(candle.clone()).is_err() {
            PipelineCounters::incr(&self.counters.persist_channel_dropped);
            warn!(
                "Persist channel full, candle not queued for storage: {}:{}",
                candle.symbol, candle.timeframe
            );
        }

        if self
            .artifact_tx
            .try_send(Artifact::Candle(candle.clone()))
            .is_err()
        {
            PipelineCounters::incr(&self.counters.broadcast_dropped);
        }

        if let Some(enriched) = self.service.process(&candle).await
            && self
                .artifact_tx
                .try_send(Artifact::Enriched(enriched))
                .is_err()
        {
            PipelineCounters::incr(&self.counters.broadcast_dropped);
        }
    }
}
