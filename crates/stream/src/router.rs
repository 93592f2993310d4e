use dashmap::DashMap;
use futures::StreamExt;
use rosoku_core::common::TimeFrame;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::feed::entity::MarketEvent;
use rosoku_core::feed::port::EventStream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// # Summary
/// 单个路由目的地：某证券某周期聚合器的收件箱。
struct Route {
    timeframe: TimeFrame,
    inbox: mpsc::Sender<MarketEvent>,
}

/// # Summary
/// 事件路由器。把每个事件扇出到其证券名下注册的全部聚合器。
///
/// # Invariants
/// - 投递对每个目的地都是非阻塞的：收件箱满只影响该目的地，
///   丢弃并递增 `agg_input_dropped`。
/// - 未注册证券的事件静默丢弃 (无操作)。
pub struct EventRouter {
    // 证券代码 → 该证券名下全部周期的收件箱
    routes: DashMap<String, Vec<Route>>,
    counters: Arc<PipelineCounters>,
}

impl EventRouter {
    /// # Summary
    /// 创建空路由表。
    ///
    /// # Arguments
    /// * `counters`: 全局流水线计数器。
    pub fn new(counters: Arc<PipelineCounters>) -> Self {
        Self {
            routes: DashMap::new(),
            counters,
        }
    }

    /// # Summary
    /// 注册一个聚合器收件箱。同键同周期的既有路由被顶替，
    /// 协程重启后旧的失效发送端不会残留。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `timeframe`: 聚合周期。
    /// * `inbox`: 收件箱发送端。
    pub fn register(&self, symbol: &str, timeframe: TimeFrame, inbox: mpsc::Sender<MarketEvent>) {
        let mut routes = self.routes.entry(symbol.to_string()).or_default();
        match routes.iter_mut().find(|r| r.timeframe == timeframe) {
            Some(route) => route.inbox = inbox,
            None => routes.push(Route { timeframe, inbox }),
        }
    }

    /// # Summary
    /// 注销某证券的全部路由。发送端随之析构，收件箱关闭，
    /// 对应聚合器冲洗后退出。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    pub fn unregister_symbol(&self, symbol: &str) {
        self.routes.remove(symbol);
    }

    /// # Summary
    /// 路由单个事件。
    ///
    /// # Logic
    /// 1. 按证券代码查路由表；未命中为无操作。
    /// 2. 逐目的地 try_send；满则只对该目的地丢弃并计数。
    ///
    /// # Arguments
    /// * `event`: 归一化行情事件。
    pub fn route(&self, event: &MarketEvent) {
        let Some(routes) = self.routes.get(&event.symbol) else {
            return;
        };
        for route in routes.iter() {
            match route.inbox.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    PipelineCounters::incr(&self.counters.agg_input_dropped);
                    trace!(
                        "Inbox full for {}:{}, event dropped",
                        event.symbol, route.timeframe
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(
                        "Inbox closed for {}:{}, event discarded",
                        event.symbol, route.timeframe
                    );
                }
            }
        }
    }

    /// # Summary
    /// 路由协程：持续消费行情源输出流直到流结束或收到停止信号。
    ///
    /// # Arguments
    /// * `events`: 行情源输出流。
    /// * `token`: 停止信号。
    pub async fn run(self: Arc<Self>, mut events: EventStream, token: CancellationToken) {
        info!("Event router started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                maybe = events.next() => match maybe {
                    Some(event) => self.route(&event),
                    None => break,
                },
            }
        }
        info!("Event router exited");
    }

    /// 当前注册的证券数量
    pub fn symbol_count(&self) -> usize {
        self.routes.len()
    }
}
