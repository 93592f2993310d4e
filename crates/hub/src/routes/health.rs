use axum::Json;
use axum::extract::State;

use crate::server::AppState;
use crate::types::{ApiResponse, HealthResponse};

/// 聚合健康检查
///
/// 行情源在线即 "ok"，否则 "degraded"；始终返回 200。
#[utoipa::path(
    get,
    path = "/health",
    tag = "健康 (Health)",
    responses(
        (status = 200, description = "健康信息", body = ApiResponse<HealthResponse>)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let feed_connected = state.feed.status().connected;
    let response = HealthResponse {
        status: if feed_connected { "ok" } else { "degraded" }.to_string(),
        feed_connected,
        client_count: state.hub.client_count(),
        worker_count: state.stream.worker_count(),
    };
    Json(ApiResponse::ok(response))
}
