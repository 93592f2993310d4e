//! # WebSocket 客户端生命周期
//!
//! 每条连接拆分为读/写两个循环：写循环排空出站队列并按 54s
//! 节拍发送保活 Ping；读循环解码控制消息并执行 60s 空闲断开。
//! 出站队列关闭 (中枢注销或慢消费剔除) 即写循环的终止信号。

use crate::hub::{ClientId, SubscriptionHub};
use crate::messages::{ClientMessage, ServerMessage};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// 保活 Ping 节拍
const PING_INTERVAL: Duration = Duration::from_secs(54);
// 读空闲截止：超时未收到任何帧即断开
const IDLE_DEADLINE: Duration = Duration::from_secs(60);

/// # Summary
/// 服务单条 WebSocket 连接直到断开。
///
/// # Logic
/// 1. 向中枢登记，取得标识与出站队列。
/// 2. 写循环独立协程：出站消息 JSON 编码下发、定时 Ping、
///    队列关闭或停止信号时发 Close 帧退出。
/// 3. 读循环在本协程：逐帧带 60s 超时等待；任何入站帧
///    (含 Pong) 都重置空闲计时。
/// 4. 任一侧退出后向中枢注销。
///
/// # Arguments
/// * `socket`: 升级完成的 WebSocket。
/// * `hub`: 订阅中枢。
/// * `token`: 全局停止信号。
pub async fn serve_socket(socket: WebSocket, hub: Arc<SubscriptionHub>, token: CancellationToken) {
    let (id, mut outbound_rx) = hub.register();
    let (mut sink, mut source) = socket.split();

    let write_token = token.clone();
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval 的首跳立即完成，跳过以免登记即 Ping
        ping.tick().await;

        loop {
            tokio::select! {
                _ = write_token.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                maybe = outbound_rx.recv() => match maybe {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(text) => {
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Outbound message encode failed: {}", e),
                    },
                    // 队列关闭即终止信号
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            result = tokio::time::timeout(IDLE_DEADLINE, source.next()) => match result {
                Err(_) => {
                    info!("Client {} idle deadline exceeded, closing", id);
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    debug!("Client {} socket error: {}", id, e);
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            }
        };

        match frame {
            Message::Text(text) => handle_text(&hub, id, text.as_str()),
            // Pong/Ping 到达本身已重置空闲计时
            Message::Pong(_) | Message::Ping(_) => {}
            Message::Close(_) => break,
            Message::Binary(_) => {
                hub.send_to(id, ServerMessage::error("binary frames are not supported"));
            }
        }
    }

    hub.unregister(id);
    let _ = writer.await;
    debug!("Client {} connection closed", id);
}

/// # Summary
/// 处理一条客户端文本消息。
///
/// # Logic
/// 1. 解析失败或缺字段回 error 消息，不改变状态。
/// 2. `ping` 回 `pong`。
/// 3. `subscription` 按 action 分派到中枢；校验错误原样回传。
fn handle_text(hub: &SubscriptionHub, id: ClientId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => {
            hub.send_to(id, ServerMessage::error("malformed message"));
            return;
        }
    };

    match message.kind.as_str() {
        "ping" => hub.send_to(id, ServerMessage::pong()),
        "subscription" => {
            let (Some(symbol), Some(timeframe), Some(action)) =
                (message.symbol, message.timeframe, message.action)
            else {
                hub.send_to(
                    id,
                    ServerMessage::error("subscription requires symbol, timeframe and action"),
                );
                return;
            };

            let result = match action.as_str() {
                "subscribe" => hub.subscribe(id, &symbol, &timeframe),
                "unsubscribe" => hub.unsubscribe(id, &symbol, &timeframe),
                other => Err(format!("unknown action: {}", other)),
            };
            if let Err(reason) = result {
                hub.send_to(id, ServerMessage::error(reason));
            }
        }
        other => {
            hub.send_to(id, ServerMessage::error(format!("unknown message type: {}", other)));
        }
    }
}
