use std::sync::Arc;
use std::time::Duration;

use rosoku_cache::mem::TtlCache;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::common::time::RealTimeProvider;
use rosoku_core::enrich::port::EnrichOptions;
use rosoku_core::feed::entity::FeedState;
use rosoku_core::feed::port::FeedAdapter;
use rosoku_enrich::engine::EnrichEngine;
use rosoku_enrich::service::EnrichmentService;
use rosoku_feed::alpaca::AlpacaFeed;
use rosoku_feed::synthetic::SyntheticFeed;
use rosoku_hub::hub::SubscriptionHub;
use rosoku_store::candle::SqliteCandleStore;
use rosoku_store::sink::PersistSink;
use rosoku_stream::manager::StreamManager;
use rosoku_stream::router::EventRouter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod pipeline;

// 关停预算：超过即放弃等待强制退出
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(30);
// 持久化 fork 通道容量
const PERSIST_CHANNEL_CAPACITY: usize = 512;
// 富化 → 中枢的制品通道容量
const ARTIFACT_CHANNEL_CAPACITY: usize = 1024;

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 接线成流水线：
/// 行情源 → 路由器 → 聚合器 → [持久化 fork + 富化] → 订阅中枢。
///
/// # Logic
/// 1. 初始化全局日志与配置。
/// 2. 实例化基础设施层 (Store、Cache、Feed)。
/// 3. 实例化聚合与富化层并接线有界通道。
/// 4. 挂载网关，等待退出信号，在关停预算内排空。
#[tokio::main]
async fn main() {
    // 1. 初始化两路输出日志 (控制台 + 滚动文件)
    let file_appender = tracing_appender::rolling::daily("logs", "rosoku.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(
            std::io::stdout
                .with_max_level(tracing::Level::INFO)
                .and(non_blocking.with_max_level(tracing::Level::DEBUG)),
        )
        .with_ansi(true)
        .init();

    info!("Rosoku engine starting...");

    // 2. 加载全局配置 (config.toml + ROSOKU_ 环境变量覆盖)
    let app_config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = app_config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }
    info!("Configuration loaded: {:?}", app_config);

    let counters = Arc::new(PipelineCounters::default());
    let token = CancellationToken::new();

    // 3. 实例化基础设施层
    let data_dir = std::path::PathBuf::from(&app_config.database.data_dir);
    let store: Arc<SqliteCandleStore> = match SqliteCandleStore::open(&data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Candle store unavailable: {}", e);
            std::process::exit(2);
        }
    };
    let cache = Arc::new(TtlCache::new(Duration::from_secs(
        app_config.cache.ttl_minutes * 60,
    )));

    let feed: Arc<dyn FeedAdapter> = if app_config.feed.use_mock {
        info!(
            "Using synthetic feed at {}x speed",
            app_config.feed.speed_multiplier
        );
        Arc::new(SyntheticFeed::new(
            app_config.feed.speed_multiplier,
            42,
            Arc::new(RealTimeProvider),
            counters.clone(),
            token.child_token(),
        ))
    } else {
        Arc::new(AlpacaFeed::new(
            app_config.feed.ws_url.clone(),
            app_config.feed.api_key.clone(),
            app_config.feed.api_secret.clone(),
            counters.clone(),
            token.child_token(),
        ))
    };

    // 4. 聚合层：路由器 + 按键注册表
    let router = Arc::new(EventRouter::new(counters.clone()));
    let (completed_tx, completed_rx) = mpsc::channel(app_config.worker.buffer_size);
    let stream = StreamManager::new(
        router.clone(),
        completed_tx,
        app_config.worker.clone(),
        counters.clone(),
        token.clone(),
    );

    // 5. 持久化汇点
    let (persist_tx, persist_rx) = mpsc::channel(PERSIST_CHANNEL_CAPACITY);
    let sink = PersistSink::new(store, persist_rx, counters.clone(), token.clone());
    let sink_handle = tokio::spawn(sink.run());

    // 6. 富化层与订阅中枢
    let enricher = Arc::new(EnrichEngine::new(cache.clone()));
    let options = EnrichOptions {
        deadline: Duration::from_millis(app_config.enrichment.timeout_ms),
        min_history: app_config.enrichment.min_history_periods,
        partial_on_timeout: true,
        chart_patterns: app_config.enrichment.chart_patterns,
    };
    let service = EnrichmentService::new(enricher, cache, options);

    let hub = SubscriptionHub::new(counters.clone());
    let (artifact_tx, artifact_rx) = mpsc::channel(ARTIFACT_CHANNEL_CAPACITY);
    let hub_handle = tokio::spawn(hub.clone().run(artifact_rx, token.clone()));

    let (invalidate_tx, invalidate_rx) = mpsc::unbounded_channel();
    let pipeline = pipeline::PipelineTask::new(
        completed_rx,
        persist_tx,
        artifact_tx,
        invalidate_rx,
        service,
        counters.clone(),
        token.clone(),
    );
    let pipeline_handle = tokio::spawn(pipeline.run());

    // 7. 行情源启动与受监督的路由协程
    if let Err(e) = feed.start().await {
        error!("Feed startup failed: {}", e);
        std::process::exit(1);
    }
    let router_handle = tokio::spawn(supervise_router(
        router.clone(),
        feed.clone(),
        token.clone(),
    ));

    // 8. 接入配置的初始证券
    for symbol in &app_config.feed.symbols {
        match stream.add_symbol(symbol) {
            Ok(_) => {
                if let Err(e) = feed.subscribe(std::slice::from_ref(symbol)).await {
                    warn!("Initial subscribe failed for {}: {}", symbol, e);
                }
            }
            Err(e) => warn!("Initial symbol {} rejected: {}", symbol, e),
        }
    }

    // 9. 挂载网关
    let state = rosoku_hub::server::AppState {
        hub: hub.clone(),
        stream: stream.clone(),
        feed: feed.clone(),
        counters: counters.clone(),
        invalidate_tx,
        token: token.clone(),
    };
    let bind_addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = rosoku_hub::server::start_server(state, &bind_addr).await {
            error!("Gateway failed: {}", e);
        }
    });

    // 10. 挂起等待退出信号；鉴权失败为致命启动错误
    info!("Pipeline and gateway are fully running. Waiting for signals...");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = watch_auth_failure(feed.clone()) => {
            error!("Feed authentication rejected, exiting");
            std::process::exit(1);
        }
    }

    // 11. 关停：停止接入、冲洗聚合器、在预算内排空
    token.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_BUDGET, async {
        feed.stop().await;
        stream.shutdown().await;
        let _ = pipeline_handle.await;
        let _ = sink_handle.await;
        let _ = router_handle.await;
        let _ = hub_handle.await;
        let _ = server_handle.await;
    })
    .await;

    match drained {
        Ok(()) => info!("Shutdown complete"),
        Err(_) => {
            warn!("Shutdown budget exceeded, exiting anyway");
            std::process::exit(2);
        }
    }
}

/// # Summary
/// 从 config.toml 与 ROSOKU_ 前缀环境变量装配配置；
/// 两者皆缺省时回退内置默认值。
fn load_config() -> Result<rosoku_core::config::AppConfig, Box<dyn std::error::Error>> {
    let config_file = std::path::Path::new("config.toml");
    let mut builder = config::Config::builder();

    if config_file.exists() {
        builder = builder.add_source(config::File::from(config_file).required(true));
    }
    builder = builder.add_source(config::Environment::with_prefix("ROSOKU").separator("__"));

    let raw = builder.build()?;
    if config_file.exists() || std::env::var("ROSOKU__SERVER__PORT").is_ok() {
        Ok(raw.try_deserialize()?)
    } else {
        // 完全无配置时回退默认值 (合成行情 + 本地数据目录)
        Ok(rosoku_core::config::AppConfig::default())
    }
}

/// # Summary
/// 路由协程监督循环。
///
/// # Logic
/// 1. 以新的行情输出读取端运行路由协程。
/// 2. 正常结束 (流关闭或停止信号) 即退出。
/// 3. panic 结束时记录完整上下文并重启；重启后挂载的新读取端
///    从输出环当前位置继续，期间被覆盖的事件计入 `feed_dropped`。
async fn supervise_router(
    router: Arc<EventRouter>,
    feed: Arc<dyn FeedAdapter>,
    token: CancellationToken,
) {
    loop {
        let run = tokio::spawn(router.clone().run(feed.output(), token.clone()));
        match run.await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                error!("Event router panicked, restarting: {:?}", e);
                if token.is_cancelled() {
                    break;
                }
            }
            Err(e) => {
                warn!("Event router aborted: {:?}", e);
                break;
            }
        }
    }
}

/// # Summary
/// 轮询行情源状态，鉴权失败时完成 (驱动主循环退出)。
async fn watch_auth_failure(feed: Arc<dyn FeedAdapter>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        if feed.status().state == FeedState::AuthFailed {
            return;
        }
    }
}
