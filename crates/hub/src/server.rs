//! # 网关启动器
//!
//! 组装 axum 路由 (WebSocket + 控制面)、挂载 Swagger UI、配置 CORS
//! 并绑定 TCP 端口对外提供服务。本模块不直接启动 `main()`,
//! 而是由 `crates/app` 的 DI 容器持有并调用。

use std::sync::Arc;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::feed::port::FeedAdapter;
use rosoku_stream::manager::StreamManager;

use crate::client;
use crate::hub::SubscriptionHub;
use crate::routes::{health, stream};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有成员在服务启动前由 DI 容器注入，生命周期与进程等同。
/// - 聚合器生命周期只经由控制面变更；订阅图只经由中枢变更。
#[derive(Clone)]
pub struct AppState {
    /// 订阅中枢
    pub hub: Arc<SubscriptionHub>,
    /// 聚合器注册表
    pub stream: Arc<StreamManager>,
    /// 行情源适配器端口
    pub feed: Arc<dyn FeedAdapter>,
    /// 全局流水线计数器
    pub counters: Arc<PipelineCounters>,
    /// 证券移除通知：富化层据此丢弃窗口并失效缓存
    pub invalidate_tx: mpsc::UnboundedSender<String>,
    /// 全局停止信号 (传递给每条 WebSocket 连接)
    pub token: CancellationToken,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rosoku 流式 K 线引擎 API",
        version = "0.1.0",
        description = "实时行情聚合与富化流水线的控制面。WebSocket 入口位于 /ws (订阅消息协议见 README)。",
        contact(name = "Rosoku Team"),
        license(name = "MIT")
    ),
    tags(
        (name = "流控制 (Stream)", description = "证券接入/移除与流状态查询"),
        (name = "健康 (Health)", description = "聚合健康检查")
    )
)]
pub struct ApiDoc;

// ============================================================
//  服务构建与启动
// ============================================================

/// WebSocket 升级入口
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub.clone();
    let token = state.token.clone();
    ws.on_upgrade(move |socket| client::serve_socket(socket, hub, token))
}

/// # Summary
/// 构建完整的 axum 应用 (供测试直接挂载)。
pub fn build_router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(stream::add_symbols))
        .routes(routes!(stream::remove_symbol))
        .routes(routes!(stream::stream_status))
        .routes(routes!(health::health))
        .split_for_parts();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .route("/ws", get(ws_handler))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// # Summary
/// 绑定端口并启动 HTTP/WebSocket 服务，随停止信号优雅退出。
///
/// # Arguments
/// * `state` - 由外部 DI 容器注入的共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"0.0.0.0:8080"`
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let token = state.token.clone();
    let app = build_router(state);

    tracing::info!("🚀 Rosoku gateway listening on {}", bind_addr);
    tracing::info!("📖 Swagger UI: http://{}/swagger-ui/", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}
