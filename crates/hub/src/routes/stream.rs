use axum::Json;
use axum::extract::{Path, State};
use rosoku_core::common::validate_symbol;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    AddSymbolsRequest, AddSymbolsResponse, ApiResponse, DropCountersResponse, StreamStatusResponse,
};

/// 批量接入证券
///
/// 为每个证券在默认周期集上启动聚合器，并向上游行情源追加订阅。
/// 任一代码非法时整批拒绝，不产生部分效果。
#[utoipa::path(
    post,
    path = "/stream/symbols",
    tag = "流控制 (Stream)",
    request_body = AddSymbolsRequest,
    responses(
        (status = 200, description = "接入成功", body = ApiResponse<AddSymbolsResponse>),
        (status = 400, description = "存在非法证券代码")
    )
)]
pub async fn add_symbols(
    State(state): State<AppState>,
    Json(request): Json<AddSymbolsRequest>,
) -> Result<Json<ApiResponse<AddSymbolsResponse>>, ApiError> {
    if request.symbols.is_empty() {
        return Err(ApiError::BadRequest("symbols must not be empty".to_string()));
    }
    // 先整批校验，避免部分生效
    for symbol in &request.symbols {
        validate_symbol(symbol).map_err(ApiError::BadRequest)?;
    }

    let mut added = Vec::new();
    let mut skipped = Vec::new();
    for symbol in &request.symbols {
        let started = state.stream.add_symbol(symbol).map_err(ApiError::from)?;
        if started.is_empty() {
            skipped.push(symbol.clone());
        } else {
            added.push(symbol.clone());
        }
    }

    if !added.is_empty() {
        state.feed.subscribe(&added).await.map_err(ApiError::from)?;
    }

    Ok(Json(ApiResponse::ok(AddSymbolsResponse { added, skipped })))
}

/// 移除证券
///
/// 停止该证券全部聚合器 (冲洗当前桶)、向上游退订并失效其指标缓存。
#[utoipa::path(
    delete,
    path = "/stream/symbols/{symbol}",
    tag = "流控制 (Stream)",
    params(
        ("symbol" = String, Path, description = "证券代码")
    ),
    responses(
        (status = 200, description = "移除成功", body = ApiResponse<String>),
        (status = 404, description = "证券未接入")
    )
)]
pub async fn remove_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    validate_symbol(&symbol).map_err(ApiError::BadRequest)?;

    if !state.stream.remove_symbol(&symbol).await {
        return Err(ApiError::NotFound(format!("symbol {} is not streaming", symbol)));
    }

    state
        .feed
        .unsubscribe(&[symbol.clone()])
        .await
        .map_err(ApiError::from)?;
    // 通知富化层丢弃窗口并失效缓存
    let _ = state.invalidate_tx.send(symbol.clone());

    Ok(Json(ApiResponse::ok(symbol)))
}

/// 流状态总览
///
/// 返回客户端/订阅计数、投递总量、活跃证券、行情源状态与
/// 全部背压丢弃计数。
#[utoipa::path(
    get,
    path = "/stream/status",
    tag = "流控制 (Stream)",
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<StreamStatusResponse>)
    )
)]
pub async fn stream_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<StreamStatusResponse>> {
    let snapshot = state.counters.snapshot();
    let status = StreamStatusResponse {
        client_count: state.hub.client_count(),
        subscription_count: state.hub.subscription_count(),
        messages_sent: snapshot.messages_sent,
        active_symbols: state.stream.active_symbols(),
        worker_count: state.stream.worker_count(),
        feed: state.feed.status().into(),
        drops: DropCountersResponse::from(&snapshot),
    };
    Json(ApiResponse::ok(status))
}
