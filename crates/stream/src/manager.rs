use crate::router::EventRouter;
use crate::worker::{AggregatorWorker, WATERMARK_NONE};
use dashmap::DashMap;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::common::{TimeFrame, validate_symbol};
use rosoku_core::config::WorkerConfig;
use rosoku_core::market::entity::Candle;
use rosoku_core::market::error::StreamError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// # Summary
/// 单证券名下全部聚合器协程的句柄集。
struct SymbolWorkers {
    // 证券仍在注册表中；置 false 后监督循环不再重启协程
    alive: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    timeframes: Vec<TimeFrame>,
}

/// # Summary
/// 聚合器按键注册表。证券加入时为默认周期集各生成一个
/// 单写者协程，移除时冲洗当前桶后停止。
///
/// # Invariants
/// - 每个 (symbol, timeframe) 至多一个活跃协程；崩溃的协程由
///   监督循环记录完整上下文后重启 (新收件箱顶替旧路由)。
/// - 产出水位线随键存活，重启后的协程不会重复已产出的桶。
/// - 单证券并行周期数受 `max_workers_per_symbol` 约束。
/// - 注册表是证券集合的唯一属主；Hub 与路由器都不拥有生命周期。
pub struct StreamManager {
    router: Arc<EventRouter>,
    // 与富化层共享的产出通道发送端
    completed_tx: mpsc::Sender<Candle>,
    config: WorkerConfig,
    counters: Arc<PipelineCounters>,
    // 全局停止信号，所有工作协程共享
    token: CancellationToken,
    workers: DashMap<String, SymbolWorkers>,
}

impl StreamManager {
    /// # Summary
    /// 创建注册表。
    ///
    /// # Arguments
    /// * `router`: 事件路由器。
    /// * `completed_tx`: 已收盘 K 线产出通道。
    /// * `config`: 工作协程配置。
    /// * `counters`: 全局计数器。
    /// * `token`: 全局停止信号。
    pub fn new(
        router: Arc<EventRouter>,
        completed_tx: mpsc::Sender<Candle>,
        config: WorkerConfig,
        counters: Arc<PipelineCounters>,
        token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            completed_tx,
            config,
            counters,
            token,
            workers: DashMap::new(),
        })
    }

    /// # Summary
    /// 为证券启动默认周期集的聚合器。幂等：已存在的证券为无操作。
    ///
    /// # Logic
    /// 1. 校验证券代码。
    /// 2. 截取默认周期集的前 `max_workers_per_symbol` 个。
    /// 3. 每周期同步注册首个收件箱，再启动监督循环：协程 panic
    ///    时记录完整上下文并以新收件箱重启，正常退出即结束。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    ///
    /// # Returns
    /// 本次实际启动的周期列表；证券已存在时为空列表。
    pub fn add_symbol(&self, symbol: &str) -> Result<Vec<TimeFrame>, StreamError> {
        validate_symbol(symbol).map_err(StreamError::InvalidSymbol)?;
        if self.workers.contains_key(symbol) {
            return Ok(vec![]);
        }

        let timeframes: Vec<TimeFrame> = TimeFrame::all()
            .iter()
            .take(self.config.max_workers_per_symbol)
            .copied()
            .collect();

        let alive = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(timeframes.len());
        for tf in &timeframes {
            // 首个收件箱在返回前注册，事件立即可路由
            let (inbox_tx, inbox_rx) = mpsc::channel(self.config.buffer_size);
            self.router.register(symbol, *tf, inbox_tx);
            handles.push(self.spawn_supervised(symbol, *tf, inbox_rx, alive.clone()));
        }

        info!(
            "Symbol {} added with {} aggregators",
            symbol,
            timeframes.len()
        );
        self.workers.insert(
            symbol.to_string(),
            SymbolWorkers {
                alive,
                handles,
                timeframes: timeframes.clone(),
            },
        );
        Ok(timeframes)
    }

    /// # Summary
    /// 启动单键监督循环。
    ///
    /// # Logic
    /// 1. 以当前收件箱运行聚合器协程。
    /// 2. 正常结束 (排空关闭或停止信号) 即退出监督。
    /// 3. panic 结束时记录完整上下文；证券仍存活则建新收件箱
    ///    顶替路由后重启协程，水位线延续，不重复已产出的桶。
    fn spawn_supervised(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        first_inbox: mpsc::Receiver<rosoku_core::feed::entity::MarketEvent>,
        alive: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let symbol = symbol.to_string();
        let router = self.router.clone();
        let completed_tx = self.completed_tx.clone();
        let counters = self.counters.clone();
        let token = self.token.clone();
        let grace = Duration::from_secs(self.config.aggregation_timeout_secs);
        let synthesize_empty = self.config.synthesize_empty;
        let buffer_size = self.config.buffer_size;
        let watermark = Arc::new(AtomicI64::new(WATERMARK_NONE));

        tokio::spawn(async move {
            let mut inbox = Some(first_inbox);
            loop {
                let inbox_rx = match inbox.take() {
                    Some(rx) => rx,
                    None => {
                        // 先确认证券未被移除，再顶替旧路由
                        if !alive.load(Ordering::SeqCst) || token.is_cancelled() {
                            break;
                        }
                        let (tx, rx) = mpsc::channel(buffer_size);
                        router.register(&symbol, timeframe, tx);
                        rx
                    }
                };

                let worker = AggregatorWorker::new(
                    symbol.clone(),
                    timeframe,
                    inbox_rx,
                    completed_tx.clone(),
                    grace,
                    synthesize_empty,
                    counters.clone(),
                    token.clone(),
                    watermark.clone(),
                );
                match tokio::spawn(worker.run()).await {
                    Ok(()) => break,
                    Err(e) if e.is_panic() => {
                        error!(
                            "Aggregator {}:{} panicked, restarting: {:?}",
                            symbol, timeframe, e
                        );
                        if !alive.load(Ordering::SeqCst) || token.is_cancelled() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Aggregator {}:{} aborted: {:?}", symbol, timeframe, e);
                        break;
                    }
                }
            }
        })
    }

    /// # Summary
    /// 停止证券名下全部聚合器。
    ///
    /// # Logic
    /// 1. 先熄灭存活标记，监督循环不再重启。
    /// 2. 注销路由：收件箱发送端析构，协程排空剩余事件后
    ///    冲洗当前桶自然退出 (全局停止信号才会跳过排空)。
    /// 3. 等待全部协程退出。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    ///
    /// # Returns
    /// 证券不存在时为无操作，返回 false。
    pub async fn remove_symbol(&self, symbol: &str) -> bool {
        let Some((_, workers)) = self.workers.remove(symbol) else {
            return false;
        };
        workers.alive.store(false, Ordering::SeqCst);
        self.router.unregister_symbol(symbol);
        for handle in workers.handles {
            if handle.await.is_err() {
                warn!("Aggregator supervisor for {} ended abnormally", symbol);
            }
        }
        info!("Symbol {} removed", symbol);
        true
    }

    /// # Summary
    /// 停止全部证券 (关停路径)，逐一冲洗后退出。
    pub async fn shutdown(&self) {
        let symbols: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        for symbol in symbols {
            self.remove_symbol(&symbol).await;
        }
    }

    /// 当前活跃证券列表
    pub fn active_symbols(&self) -> Vec<String> {
        self.workers.iter().map(|e| e.key().clone()).collect()
    }

    /// 证券是否在注册表中
    pub fn contains(&self, symbol: &str) -> bool {
        self.workers.contains_key(symbol)
    }

    /// 活跃聚合器总数
    pub fn worker_count(&self) -> usize {
        self.workers.iter().map(|e| e.timeframes.len()).sum()
    }
}
