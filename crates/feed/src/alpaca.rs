use crate::backoff::Backoff;
use crate::output::wrap_output;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::feed::entity::{BarData, FeedState, FeedStatus, MarketEvent};
use rosoku_core::feed::error::FeedError;
use rosoku_core::feed::port::{EventStream, FeedAdapter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// # Summary
/// 上游鉴权帧。
#[derive(Serialize)]
struct AuthFrame<'a> {
    action: &'static str,
    key: &'a str,
    secret: &'a str,
}

/// # Summary
/// 上游订阅/退订帧，三个通道均携带同一份证券列表。
#[derive(Serialize)]
struct SubscriptionFrame<'a> {
    action: &'static str,
    trades: &'a [String],
    quotes: &'a [String],
    bars: &'a [String],
}

/// # Summary
/// 上游下行帧的扁平映射。`T` 区分帧类型：
/// t=成交, q=报价, b=Bar, success/error/subscription=控制帧。
#[derive(Deserialize, Debug)]
struct WireMessage {
    #[serde(rename = "T")]
    kind: String,
    #[serde(rename = "S")]
    symbol: Option<String>,
    // 成交价
    #[serde(rename = "p")]
    price: Option<f64>,
    // 成交量
    #[serde(rename = "s")]
    size: Option<i64>,
    // 事件时间
    #[serde(rename = "t")]
    time: Option<DateTime<Utc>>,
    // Bar OHLCV
    #[serde(rename = "o")]
    open: Option<f64>,
    #[serde(rename = "h")]
    high: Option<f64>,
    #[serde(rename = "l")]
    low: Option<f64>,
    #[serde(rename = "c")]
    close: Option<f64>,
    #[serde(rename = "v")]
    volume: Option<i64>,
    // 报价买卖双边
    #[serde(rename = "bp")]
    bid_price: Option<f64>,
    #[serde(rename = "ap")]
    ask_price: Option<f64>,
    // 控制帧载荷
    msg: Option<String>,
    code: Option<i64>,
}

/// # Summary
/// 会话结束原因，驱动外层重连循环的分支。
enum SessionEnd {
    // 链路中断，可重连
    Disconnected,
    // 鉴权被拒，致命
    AuthFailed,
    // 收到停止信号
    Cancelled,
}

/// # Summary
/// 订阅集变更指令，由句柄发往运行中的会话协程。
enum ControlCommand {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
}

/// # Summary
/// 适配器内部共享状态：订阅集与连接状态机。
struct FeedShared {
    // 当前订阅集，重连后整体重放
    subscribed: Mutex<BTreeSet<String>>,
    // 连接状态
    state: Mutex<FeedState>,
    // 自上次成功连接以来的重连尝试次数
    reconnect_attempts: AtomicU32,
}

impl FeedShared {
    fn set_state(&self, next: FeedState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn state(&self) -> FeedState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(FeedState::Disconnected)
    }

    fn subscribed_vec(&self) -> Vec<String> {
        self.subscribed
            .lock()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// # Summary
/// 上游 WebSocket 行情适配器实现。
///
/// # Invariants
/// - 事件按上游顺序写入输出环，不做重排。
/// - 重连成功后必须先重放订阅集再恢复事件转发。
/// - 鉴权失败为致命：状态置为 AuthFailed 并停止重连。
pub struct AlpacaFeed {
    // 网关地址
    ws_url: String,
    // 鉴权凭据
    api_key: String,
    api_secret: String,
    // 有界输出环发送端
    events_tx: broadcast::Sender<MarketEvent>,
    // 共享状态
    shared: Arc<FeedShared>,
    // 全局计数器
    counters: Arc<PipelineCounters>,
    // 停止信号
    token: CancellationToken,
    // 运行中会话的控制通道 (未启动时为 None)
    control_tx: Mutex<Option<mpsc::UnboundedSender<ControlCommand>>>,
}

impl AlpacaFeed {
    /// # Summary
    /// 创建适配器实例。不建立连接，连接在 `start` 时发起。
    ///
    /// # Arguments
    /// * `ws_url`: 网关地址。
    /// * `api_key` / `api_secret`: 上游鉴权凭据。
    /// * `counters`: 全局流水线计数器。
    /// * `token`: 停止信号。
    ///
    /// # Returns
    /// 适配器实例。
    pub fn new(
        ws_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        counters: Arc<PipelineCounters>,
        token: CancellationToken,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(crate::OUTPUT_CAPACITY);
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            events_tx,
            shared: Arc::new(FeedShared {
                subscribed: Mutex::new(BTreeSet::new()),
                state: Mutex::new(FeedState::Disconnected),
                reconnect_attempts: AtomicU32::new(0),
            }),
            counters,
            token,
            control_tx: Mutex::new(None),
        }
    }

    fn push_control(&self, cmd: ControlCommand) {
        if let Ok(guard) = self.control_tx.lock()
            && let Some(tx) = guard.as_ref()
        {
            let _ = tx.send(cmd);
        }
    }
}

#[async_trait]
impl FeedAdapter for AlpacaFeed {
    /// # Summary
    /// 启动连接协程。重复调用为无操作。
    ///
    /// # Logic
    /// 1. 校验凭据存在，缺失视为致命配置错误。
    /// 2. 创建控制通道并登记发送端。
    /// 3. 启动 FeedRunner 重连循环。
    async fn start(&self) -> Result<(), FeedError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(FeedError::Auth("missing api credentials".to_string()));
        }

        let mut guard = self
            .control_tx
            .lock()
            .map_err(|_| FeedError::Connect("control channel poisoned".to_string()))?;
        if guard.is_some() {
            return Ok(());
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *guard = Some(control_tx);
        drop(guard);

        let runner = FeedRunner {
            ws_url: self.ws_url.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            events_tx: self.events_tx.clone(),
            shared: self.shared.clone(),
            token: self.token.clone(),
            control_rx,
        };
        tokio::spawn(runner.run());
        Ok(())
    }

    /// # Summary
    /// 停止适配器：发出取消信号并标记断开。
    async fn stop(&self) {
        self.token.cancel();
        self.shared.set_state(FeedState::Disconnected);
    }

    /// # Summary
    /// 将证券加入订阅集，运行中则同步向上游发送订阅帧。幂等。
    async fn subscribe(&self, symbols: &[String]) -> Result<(), FeedError> {
        let fresh: Vec<String> = {
            let mut set = self
                .shared
                .subscribed
                .lock()
                .map_err(|_| FeedError::Subscribe("subscription set poisoned".to_string()))?;
            symbols
                .iter()
                .filter(|s| set.insert((*s).clone()))
                .cloned()
                .collect()
        };
        if !fresh.is_empty() {
            self.push_control(ControlCommand::Subscribe(fresh));
        }
        Ok(())
    }

    /// # Summary
    /// 将证券移出订阅集，运行中则同步向上游发送退订帧。幂等。
    async fn unsubscribe(&self, symbols: &[String]) -> Result<(), FeedError> {
        let removed: Vec<String> = {
            let mut set = self
                .shared
                .subscribed
                .lock()
                .map_err(|_| FeedError::Subscribe("subscription set poisoned".to_string()))?;
            symbols
                .iter()
                .filter(|s| set.remove(*s))
                .cloned()
                .collect()
        };
        if !removed.is_empty() {
            self.push_control(ControlCommand::Unsubscribe(removed));
        }
        Ok(())
    }

    fn output(&self) -> EventStream {
        wrap_output(self.events_tx.subscribe(), self.counters.clone())
    }

    fn status(&self) -> FeedStatus {
        let state = self.shared.state();
        FeedStatus {
            state,
            connected: state == FeedState::Connected,
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::Relaxed),
            dropped_events: self.counters.feed_dropped.load(Ordering::Relaxed),
            subscribed: self.shared.subscribed_vec(),
        }
    }
}

/// # Summary
/// 连接协程：持有重连循环与单次会话逻辑。
///
/// # Invariants
/// - 每次会话先完成鉴权、重放订阅集，才开始转发事件。
struct FeedRunner {
    ws_url: String,
    api_key: String,
    api_secret: String,
    events_tx: broadcast::Sender<MarketEvent>,
    shared: Arc<FeedShared>,
    token: CancellationToken,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
}

impl FeedRunner {
    /// # Summary
    /// 重连主循环。
    ///
    /// # Logic
    /// 1. 建立连接；失败则按退避序列等待后重试。
    /// 2. 会话正常结束 (链路中断) 时递增重连计数并继续循环。
    /// 3. 鉴权失败或收到停止信号时退出。
    async fn run(mut self) {
        info!("Feed runner started, gateway {}", self.ws_url);
        let mut backoff = Backoff::new();
        let mut first = true;

        loop {
            if self.token.is_cancelled() {
                break;
            }
            self.shared.set_state(if first {
                FeedState::Connecting
            } else {
                FeedState::Reconnecting
            });
            first = false;

            let stream = tokio::select! {
                _ = self.token.cancelled() => break,
                conn = connect_async(&self.ws_url) => conn,
            };

            match stream {
                Ok((ws, _)) => match self.session(ws).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::AuthFailed => {
                        self.shared.set_state(FeedState::AuthFailed);
                        error!("Feed authentication rejected, giving up");
                        return;
                    }
                    SessionEnd::Disconnected => {
                        self.shared
                            .reconnect_attempts
                            .fetch_add(1, Ordering::Relaxed);
                        self.shared.set_state(FeedState::Reconnecting);
                        let delay = backoff.next_delay();
                        warn!("Feed disconnected, reconnecting in {:?}", delay);
                        tokio::select! {
                            _ = self.token.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
                Err(e) => {
                    self.shared
                        .reconnect_attempts
                        .fetch_add(1, Ordering::Relaxed);
                    let delay = backoff.next_delay();
                    warn!("Feed connect failed: {}, retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.shared.set_state(FeedState::Disconnected);
        info!("Feed runner exited");
    }

    /// # Summary
    /// 单次 WebSocket 会话。
    ///
    /// # Logic
    /// 1. 发送鉴权帧，等待上游确认。
    /// 2. 确认后重放当前订阅集并清零重连计数。
    /// 3. select 循环：转发行情帧、应答 Ping、处理订阅变更指令、
    ///    响应停止信号。
    ///
    /// # Returns
    /// 会话结束原因。
    async fn session(
        &mut self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> SessionEnd {
        let (mut sink, mut source) = ws.split();

        let auth = AuthFrame {
            action: "auth",
            key: &self.api_key,
            secret: &self.api_secret,
        };
        let frame = match serde_json::to_string(&auth) {
            Ok(f) => f,
            Err(e) => {
                error!("Auth frame encode failed: {}", e);
                return SessionEnd::Disconnected;
            }
        };
        if sink.send(Message::text(frame)).await.is_err() {
            return SessionEnd::Disconnected;
        }

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                cmd = self.control_rx.recv() => {
                    if let Some(cmd) = cmd {
                        let (action, symbols) = match &cmd {
                            ControlCommand::Subscribe(s) => ("subscribe", s),
                            ControlCommand::Unsubscribe(s) => ("unsubscribe", s),
                        };
                        let frame = SubscriptionFrame { action, trades: symbols, quotes: symbols, bars: symbols };
                        match serde_json::to_string(&frame) {
                            Ok(text) => {
                                if sink.send(Message::text(text)).await.is_err() {
                                    return SessionEnd::Disconnected;
                                }
                            }
                            // 订阅错误不致命：记录后继续会话
                            Err(e) => warn!("Subscription frame encode failed: {}", e),
                        }
                    }
                }
                msg = source.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_frame(text.as_str()) {
                                FrameOutcome::Continue => {}
                                FrameOutcome::Authenticated => {
                                    self.shared.set_state(FeedState::Connected);
                                    self.shared.reconnect_attempts.store(0, Ordering::Relaxed);
                                    let symbols = self.shared.subscribed_vec();
                                    if !symbols.is_empty() {
                                        let frame = SubscriptionFrame {
                                            action: "subscribe",
                                            trades: &symbols,
                                            quotes: &symbols,
                                            bars: &symbols,
                                        };
                                        match serde_json::to_string(&frame) {
                                            Ok(text) => {
                                                info!("Replaying subscriptions for {} symbols", symbols.len());
                                                if sink.send(Message::text(text)).await.is_err() {
                                                    return SessionEnd::Disconnected;
                                                }
                                            }
                                            Err(e) => warn!("Subscription frame encode failed: {}", e),
                                        }
                                    }
                                }
                                FrameOutcome::AuthRejected => return SessionEnd::AuthFailed,
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if sink.send(Message::Pong(payload)).await.is_err() {
                                return SessionEnd::Disconnected;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Feed socket error: {}", e);
                            return SessionEnd::Disconnected;
                        }
                    }
                }
            }
        }
    }

    /// # Summary
    /// 处理一条下行文本帧 (可能是帧数组)。
    ///
    /// # Logic
    /// 1. 解析为 WireMessage 数组 (单帧视为单元素数组)。
    /// 2. 控制帧驱动鉴权状态；行情帧转为归一化事件写入输出环。
    ///
    /// # Returns
    /// 帧处理结果：继续 / 已鉴权 / 鉴权被拒。
    fn handle_frame(&self, text: &str) -> FrameOutcome {
        let messages: Vec<WireMessage> = match serde_json::from_str::<Vec<WireMessage>>(text) {
            Ok(batch) => batch,
            Err(_) => match serde_json::from_str::<WireMessage>(text) {
                Ok(single) => vec![single],
                Err(e) => {
                    warn!("Unparseable feed frame: {}", e);
                    return FrameOutcome::Continue;
                }
            },
        };

        let mut outcome = FrameOutcome::Continue;
        for wire in messages {
            match wire.kind.as_str() {
                "success" => {
                    if wire.msg.as_deref() == Some("authenticated") {
                        outcome = FrameOutcome::Authenticated;
                    }
                }
                "error" => {
                    // 401/402 为鉴权类错误码
                    if matches!(wire.code, Some(401) | Some(402)) {
                        return FrameOutcome::AuthRejected;
                    }
                    warn!(
                        "Feed error frame: code={:?} msg={:?}",
                        wire.code, wire.msg
                    );
                }
                "subscription" => {
                    debug!("Subscription ack: {:?}", wire.msg);
                }
                _ => {
                    if let Some(event) = normalize(wire) {
                        // 无订阅者时发送失败是正常情况
                        let _ = self.events_tx.send(event);
                    }
                }
            }
        }
        outcome
    }
}

/// 帧处理结果
enum FrameOutcome {
    Continue,
    Authenticated,
    AuthRejected,
}

/// # Summary
/// 将上游行情帧归一化为统一事件。
///
/// # Logic
/// 1. t 帧取成交价/量；q 帧取买卖中间价、量为 0；
///    b 帧携带完整 OHLC。
/// 2. 缺少必要字段的帧丢弃。
///
/// # Arguments
/// * `wire`: 上游帧。
///
/// # Returns
/// 归一化事件，字段不全返回 None。
fn normalize(wire: WireMessage) -> Option<MarketEvent> {
    let symbol = wire.symbol?;
    let time = wire.time?;
    match wire.kind.as_str() {
        "t" => Some(MarketEvent::trade(
            symbol,
            time,
            wire.price?,
            wire.size.unwrap_or(0),
        )),
        "q" => {
            let bid = wire.bid_price?;
            let ask = wire.ask_price?;
            let mut event = MarketEvent::trade(symbol, time, (bid + ask) / 2.0, 0);
            event.kind = rosoku_core::feed::entity::EventKind::Quote;
            Some(event)
        }
        "b" => Some(MarketEvent::bar(
            symbol,
            time,
            BarData {
                open: wire.open?,
                high: wire.high?,
                low: wire.low?,
                close: wire.close?,
            },
            wire.volume.unwrap_or(0),
        )),
        _ => None,
    }
}
