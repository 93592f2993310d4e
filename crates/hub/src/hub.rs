use crate::messages::ServerMessage;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::common::{TimeFrame, subscription_key, validate_symbol};
use rosoku_core::enrich::entity::EnrichedCandle;
use rosoku_core::market::entity::Candle;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 每客户端出站队列容量：溢出即判定为慢消费者
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// 客户端不透明标识
pub type ClientId = Uuid;

/// # Summary
/// 广播制品：已收盘或已富化的 K 线。
pub enum Artifact {
    Candle(Candle),
    Enriched(EnrichedCandle),
}

impl Artifact {
    fn key(&self) -> String {
        match self {
            Artifact::Candle(c) => subscription_key(&c.symbol, c.timeframe),
            Artifact::Enriched(e) => subscription_key(&e.base.symbol, e.base.timeframe),
        }
    }

    fn to_message(&self) -> ServerMessage {
        match self {
            Artifact::Candle(c) => ServerMessage::candle(c),
            Artifact::Enriched(e) => ServerMessage::enriched_candle(e),
        }
    }
}

/// 单客户端登记项
struct ClientEntry {
    // 有界出站队列发送端；析构即通知写循环退出
    outbound: mpsc::Sender<ServerMessage>,
    // 反向订阅键集合
    keys: HashSet<String>,
}

/// # Summary
/// 订阅中枢。持有正向 (订阅键 → 客户端集合) 与反向
/// (客户端 → 订阅键集合) 两张图。
///
/// # Invariants
/// - 两张图只经由本结构的方法变更，写锁内完成，保持互为镜像。
/// - 广播对每个订阅者非阻塞：队列满即剔除该客户端
///   (慢消费者绝不反压生产者)。
/// - 订阅/退订幂等；非法 symbol/timeframe 校验失败不改变状态。
pub struct SubscriptionHub {
    // 订阅键 → 客户端集合
    forward: RwLock<HashMap<String, HashSet<ClientId>>>,
    // 客户端登记表
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
    counters: Arc<PipelineCounters>,
}

impl SubscriptionHub {
    /// # Summary
    /// 创建空中枢。
    ///
    /// # Arguments
    /// * `counters`: 全局流水线计数器。
    pub fn new(counters: Arc<PipelineCounters>) -> Arc<Self> {
        Arc::new(Self {
            forward: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            counters,
        })
    }

    /// # Summary
    /// 登记新客户端。
    ///
    /// # Logic
    /// 1. 分配 uuid 与容量 256 的出站队列。
    /// 2. 以空订阅集入表。
    /// 3. 将 connected 通知预置入队。
    ///
    /// # Returns
    /// (客户端标识, 出站队列接收端)。
    pub fn register(&self) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let _ = tx.try_send(ServerMessage::connected());

        if let Ok(mut clients) = self.clients.write() {
            clients.insert(
                id,
                ClientEntry {
                    outbound: tx,
                    keys: HashSet::new(),
                },
            );
        }
        info!("Client {} registered", id);
        (id, rx)
    }

    /// # Summary
    /// 注销客户端：从所有订阅集中移除并关闭出站队列。
    ///
    /// # Arguments
    /// * `id`: 客户端标识。
    pub fn unregister(&self, id: ClientId) {
        let keys = match self.clients.write() {
            Ok(mut clients) => clients.remove(&id).map(|e| e.keys).unwrap_or_default(),
            Err(_) => return,
        };
        if let Ok(mut forward) = self.forward.write() {
            for key in keys {
                if let Some(set) = forward.get_mut(&key) {
                    set.remove(&id);
                    if set.is_empty() {
                        forward.remove(&key);
                    }
                }
            }
        }
        info!("Client {} unregistered", id);
    }

    /// # Summary
    /// 订阅 (symbol, timeframe)。幂等。
    ///
    /// # Logic
    /// 1. 校验证券代码 (1-5 位大写字母) 与周期字符串。
    /// 2. 校验失败不触碰任何状态，返回描述性错误。
    /// 3. 双图同步更新。
    ///
    /// # Arguments
    /// * `id`: 客户端标识。
    /// * `symbol`: 证券代码。
    /// * `timeframe`: 周期字符串 (长短形式均可)。
    ///
    /// # Returns
    /// 成功返回规范化后的 (symbol, TimeFrame)。
    pub fn subscribe(
        &self,
        id: ClientId,
        symbol: &str,
        timeframe: &str,
    ) -> Result<(String, TimeFrame), String> {
        validate_symbol(symbol)?;
        let tf = TimeFrame::from_str(timeframe)?;
        let key = subscription_key(symbol, tf);

        let mut clients = self.clients.write().map_err(|_| "hub poisoned".to_string())?;
        let entry = clients
            .get_mut(&id)
            .ok_or_else(|| "client not registered".to_string())?;
        entry.keys.insert(key.clone());
        drop(clients);

        if let Ok(mut forward) = self.forward.write() {
            forward.entry(key).or_default().insert(id);
        }
        debug!("Client {} subscribed {}:{}", id, symbol, tf);
        Ok((symbol.to_string(), tf))
    }

    /// # Summary
    /// 退订 (symbol, timeframe)。幂等：未订阅时为无操作。
    pub fn unsubscribe(
        &self,
        id: ClientId,
        symbol: &str,
        timeframe: &str,
    ) -> Result<(String, TimeFrame), String> {
        validate_symbol(symbol)?;
        let tf = TimeFrame::from_str(timeframe)?;
        let key = subscription_key(symbol, tf);

        if let Ok(mut clients) = self.clients.write()
            && let Some(entry) = clients.get_mut(&id)
        {
            entry.keys.remove(&key);
        }
        if let Ok(mut forward) = self.forward.write()
            && let Some(set) = forward.get_mut(&key)
        {
            set.remove(&id);
            if set.is_empty() {
                forward.remove(&key);
            }
        }
        debug!("Client {} unsubscribed {}:{}", id, symbol, tf);
        Ok((symbol.to_string(), tf))
    }

    /// # Summary
    /// 向单个客户端投递消息 (控制应答用)。队列满时静默丢弃。
    pub fn send_to(&self, id: ClientId, message: ServerMessage) {
        if let Ok(clients) = self.clients.read()
            && let Some(entry) = clients.get(&id)
        {
            let _ = entry.outbound.try_send(message);
        }
    }

    /// # Summary
    /// 向订阅者广播制品。
    ///
    /// # Logic
    /// 1. 读锁查正向图取订阅者集合。
    /// 2. 逐订阅者非阻塞入队；成功计入 `messages_sent`。
    /// 3. 队列满的客户端收集为慢消费者，广播后统一剔除并
    ///    递增 `slow_client_evicted`。
    ///
    /// # Arguments
    /// * `artifact`: 已收盘或已富化 K 线。
    pub fn broadcast(&self, artifact: &Artifact) {
        let key = artifact.key();
        let targets: Vec<ClientId> = match self.forward.read() {
            Ok(forward) => forward
                .get(&key)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            Err(_) => return,
        };
        if targets.is_empty() {
            return;
        }

        let message = artifact.to_message();
        let mut evicted = Vec::new();
        if let Ok(clients) = self.clients.read() {
            for id in targets {
                let Some(entry) = clients.get(&id) else {
                    continue;
                };
                match entry.outbound.try_send(message.clone()) {
                    Ok(()) => PipelineCounters::incr(&self.counters.messages_sent),
                    Err(mpsc::error::TrySendError::Full(_)) => evicted.push(id),
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }

        for id in evicted {
            PipelineCounters::incr(&self.counters.slow_client_evicted);
            warn!("Client {} evicted: outbound queue overflow", id);
            self.unregister(id);
        }
    }

    /// # Summary
    /// 广播协程：消费流水线投递的制品通道直到关闭或收到停止信号。
    /// 投递端以 try_send 写入，通道满由投递方计入 `broadcast_dropped`。
    ///
    /// # Arguments
    /// * `rx`: 有界制品通道接收端。
    /// * `token`: 停止信号。
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<Artifact>,
        token: tokio_util::sync::CancellationToken,
    ) {
        info!("Subscription hub broadcast loop started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                maybe = rx.recv() => match maybe {
                    Some(artifact) => self.broadcast(&artifact),
                    None => break,
                },
            }
        }
        info!("Subscription hub broadcast loop exited");
    }

    /// 当前连接的客户端数量
    pub fn client_count(&self) -> usize {
        self.clients.read().map(|c| c.len()).unwrap_or(0)
    }

    /// 当前 (client, key) 订阅对总数
    pub fn subscription_count(&self) -> usize {
        self.forward
            .read()
            .map(|f| f.values().map(|s| s.len()).sum())
            .unwrap_or(0)
    }

    /// 指定订阅键是否存在订阅者 (仅供测试观察)
    pub fn has_subscribers(&self, symbol: &str, timeframe: TimeFrame) -> bool {
        self.forward
            .read()
            .map(|f| {
                f.get(&subscription_key(symbol, timeframe))
                    .is_some_and(|s| !s.is_empty())
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(symbol: &str, tf: TimeFrame) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe: tf,
            time: chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10,
        }
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_roundtrip() {
        let hub = SubscriptionHub::new(Arc::new(PipelineCounters::default()));
        let (id, _rx) = hub.register();

        hub.subscribe(id, "AAPL", "1min").unwrap();
        assert!(hub.has_subscribers("AAPL", TimeFrame::Minute1));

        hub.unsubscribe(id, "AAPL", "1min").unwrap();
        assert!(!hub.has_subscribers("AAPL", TimeFrame::Minute1));
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_is_noop() {
        let hub = SubscriptionHub::new(Arc::new(PipelineCounters::default()));
        let (id, _rx) = hub.register();

        hub.subscribe(id, "AAPL", "1m").unwrap();
        hub.subscribe(id, "AAPL", "1min").unwrap();
        assert_eq!(hub.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_symbol_does_not_mutate() {
        let hub = SubscriptionHub::new(Arc::new(PipelineCounters::default()));
        let (id, _rx) = hub.register();

        let err = hub.subscribe(id, "aapl", "1min").unwrap_err();
        assert!(err.contains("uppercase"));
        assert_eq!(hub.subscription_count(), 0);

        assert!(hub.subscribe(id, "AAPL", "2min").is_err());
        assert_eq!(hub.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_matching_subscribers_only() {
        let hub = SubscriptionHub::new(Arc::new(PipelineCounters::default()));
        let (a, mut rx_a) = hub.register();
        let (b, mut rx_b) = hub.register();
        // 排空 connected 通知
        assert_eq!(rx_a.recv().await.unwrap().kind, "connected");
        assert_eq!(rx_b.recv().await.unwrap().kind, "connected");

        hub.subscribe(a, "AAPL", "1min").unwrap();
        hub.subscribe(b, "MSFT", "1min").unwrap();

        hub.broadcast(&Artifact::Candle(candle("AAPL", TimeFrame::Minute1)));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.kind, "candle");
        assert_eq!(received.symbol.as_deref(), Some("AAPL"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_client_evicted_at_capacity() {
        let counters = Arc::new(PipelineCounters::default());
        let hub = SubscriptionHub::new(counters.clone());

        // C 停止读取；D 正常消费
        let (c, _rx_c) = hub.register();
        let (d, mut rx_d) = hub.register();
        assert_eq!(rx_d.recv().await.unwrap().kind, "connected");
        hub.subscribe(c, "MSFT", "1min").unwrap();
        hub.subscribe(d, "MSFT", "1min").unwrap();

        let mut d_received = 0;
        for _ in 0..300 {
            hub.broadcast(&Artifact::Candle(candle("MSFT", TimeFrame::Minute1)));
            while rx_d.try_recv().is_ok() {
                d_received += 1;
            }
        }
        while rx_d.try_recv().is_ok() {
            d_received += 1;
        }

        // C 的队列 (容量 256，已被 connected 占一席) 溢出后被剔除
        assert_eq!(counters.snapshot().slow_client_evicted, 1);
        assert_eq!(hub.client_count(), 1);
        assert!(!hub.has_subscribers("MSFT", TimeFrame::Minute1) || hub.subscription_count() == 1);
        // 幸存订阅者收到全部 300 条
        assert_eq!(d_received, 300);
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let hub = SubscriptionHub::new(Arc::new(PipelineCounters::default()));
        let (id, mut rx) = hub.register();
        hub.subscribe(id, "AAPL", "1min").unwrap();

        hub.unregister(id);
        // 排空 connected 后队列关闭
        assert_eq!(rx.recv().await.unwrap().kind, "connected");
        assert!(rx.recv().await.is_none());
        assert_eq!(hub.subscription_count(), 0);
    }
}
