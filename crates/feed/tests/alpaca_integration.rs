use futures::{SinkExt, StreamExt};
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::feed::entity::{EventKind, FeedState};
use rosoku_core::feed::port::FeedAdapter;
use rosoku_feed::alpaca::AlpacaFeed;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// 模拟上游网关：完成鉴权/订阅握手后按脚本推送行情帧。
/// `drop_after_first_bar` 控制首个会话在推送一根 Bar 后立刻断链，
/// 用于验证重连路径。
struct MockGateway {
    subscribe_frames: Arc<AtomicU32>,
    auth_frames: Arc<AtomicU32>,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            subscribe_frames: Arc::new(AtomicU32::new(0)),
            auth_frames: Arc::new(AtomicU32::new(0)),
        }
    }

    async fn serve(&self, listener: TcpListener, reject_auth: bool) {
        let subscribe_frames = self.subscribe_frames.clone();
        let auth_frames = self.auth_frames.clone();

        tokio::spawn(async move {
            let mut session: u32 = 0;
            while let Ok((stream, _)) = listener.accept().await {
                session += 1;
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => continue,
                };

                // 鉴权帧
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    assert!(text.as_str().contains("\"auth\""));
                    auth_frames.fetch_add(1, Ordering::SeqCst);
                }
                if reject_auth {
                    let _ = ws
                        .send(Message::text(
                            r#"[{"T":"error","code":402,"msg":"auth failed"}]"#,
                        ))
                        .await;
                    continue;
                }
                let _ = ws
                    .send(Message::text(
                        r#"[{"T":"success","msg":"authenticated"}]"#,
                    ))
                    .await;

                // 订阅重放帧
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    assert!(text.as_str().contains("subscribe"));
                    subscribe_frames.fetch_add(1, Ordering::SeqCst);
                }

                // 每个会话推送一根带会话序号价位的 Bar
                let bar = format!(
                    r#"[{{"T":"b","S":"AAPL","o":10{s}.0,"h":10{s}.5,"l":99.5,"c":10{s}.2,"v":100,"t":"2026-03-02T12:0{s}:00Z"}}]"#,
                    s = session
                );
                let _ = ws.send(Message::text(bar)).await;

                if session == 1 {
                    // 首个会话直接断链，触发客户端重连
                    drop(ws);
                } else {
                    // 之后的会话保持到客户端退出
                    while ws.next().await.is_some() {}
                }
            }
        });
    }
}

#[tokio::test]
async fn test_reconnect_replays_subscriptions_without_duplicates() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = MockGateway::new();
    gateway.serve(listener, false).await;

    let counters = Arc::new(PipelineCounters::default());
    let token = CancellationToken::new();
    let feed = AlpacaFeed::new(
        format!("ws://{}", addr),
        "key",
        "secret",
        counters,
        token.clone(),
    );

    // 启动前订阅也必须生效
    feed.subscribe(&["AAPL".to_string()]).await.unwrap();
    let mut output = feed.output();
    feed.start().await.unwrap();

    // 第一根来自会话 1，第二根在断链重连后来自会话 2
    let mut events = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(10), output.next())
            .await
            .expect("feed should deliver across reconnect")
            .expect("stream open");
        events.push(event);
    }
    feed.stop().await;

    assert_eq!(events[0].kind, EventKind::Bar);
    assert_eq!(events[0].symbol, "AAPL");
    // 重连后的事件属于新的分钟桶，无重复桶起始时间
    assert!(events[1].time > events[0].time);

    // 两个会话各完成一次鉴权与一次订阅重放
    assert_eq!(gateway.auth_frames.load(Ordering::SeqCst), 2);
    assert_eq!(gateway.subscribe_frames.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_auth_rejection_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = MockGateway::new();
    gateway.serve(listener, true).await;

    let counters = Arc::new(PipelineCounters::default());
    let feed = AlpacaFeed::new(
        format!("ws://{}", addr),
        "key",
        "bad-secret",
        counters,
        CancellationToken::new(),
    );
    feed.start().await.unwrap();

    // 适配器必须进入 AuthFailed 且不再重连
    let mut state = FeedState::Disconnected;
    for _ in 0..100 {
        state = feed.status().state;
        if state == FeedState::AuthFailed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(state, FeedState::AuthFailed);
    assert_eq!(gateway.auth_frames.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_credentials_rejected_at_start() {
    let counters = Arc::new(PipelineCounters::default());
    let feed = AlpacaFeed::new(
        "ws://127.0.0.1:1".to_string(),
        "",
        "",
        counters,
        CancellationToken::new(),
    );
    assert!(feed.start().await.is_err());
}
