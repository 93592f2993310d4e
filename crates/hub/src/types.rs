//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。

use rosoku_core::common::metrics::CounterSnapshot;
use rosoku_core::feed::entity::{FeedState, FeedStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================
//  通用响应封装
// ============================================================

/// 统一成功响应封装
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    /// 是否成功
    pub success: bool,
    /// 数据载荷 (成功时)
    pub data: Option<T>,
}

impl<T: Serialize + ToSchema> ApiResponse<T> {
    /// 构建成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

/// 构建失败响应 (不含泛型载荷)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 错误描述信息
    pub error: String,
}

impl ApiErrorResponse {
    /// 从错误信息构建
    pub fn from_msg(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

// ============================================================
//  控制面 DTO
// ============================================================

/// 批量接入证券请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddSymbolsRequest {
    /// 证券代码列表 (1-5 位大写字母)
    pub symbols: Vec<String>,
}

/// 批量接入证券响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddSymbolsResponse {
    /// 本次新接入的证券
    pub added: Vec<String>,
    /// 已存在而跳过的证券
    pub skipped: Vec<String>,
}

/// 行情源状态 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedStatusResponse {
    /// 是否连接且完成鉴权
    pub connected: bool,
    /// 状态机文字表示
    #[schema(example = "connected")]
    pub state: String,
    /// 自上次成功连接以来的重连尝试次数
    pub reconnect_attempts: u32,
    /// 输出环溢出丢弃的事件总数
    pub dropped_events: u64,
    /// 当前订阅的证券集合
    pub subscribed: Vec<String>,
}

impl From<FeedStatus> for FeedStatusResponse {
    fn from(status: FeedStatus) -> Self {
        let state = match status.state {
            FeedState::Disconnected => "disconnected",
            FeedState::Connecting => "connecting",
            FeedState::Connected => "connected",
            FeedState::Reconnecting => "reconnecting",
            FeedState::AuthFailed => "auth_failed",
        };
        Self {
            connected: status.connected,
            state: state.to_string(),
            reconnect_attempts: status.reconnect_attempts,
            dropped_events: status.dropped_events,
            subscribed: status.subscribed,
        }
    }
}

/// 背压丢弃计数 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DropCountersResponse {
    pub feed_dropped: u64,
    pub agg_input_dropped: u64,
    pub candle_dropped: u64,
    pub broadcast_dropped: u64,
    pub slow_client_evicted: u64,
    /// 持久化 fork 通道溢出 (未入队)
    pub persist_channel_dropped: u64,
    /// 汇点写库永久失败 (重试耗尽)
    pub persist_failed: u64,
}

impl From<&CounterSnapshot> for DropCountersResponse {
    fn from(snapshot: &CounterSnapshot) -> Self {
        Self {
            feed_dropped: snapshot.feed_dropped,
            agg_input_dropped: snapshot.agg_input_dropped,
            candle_dropped: snapshot.candle_dropped,
            broadcast_dropped: snapshot.broadcast_dropped,
            slow_client_evicted: snapshot.slow_client_evicted,
            persist_channel_dropped: snapshot.persist_channel_dropped,
            persist_failed: snapshot.persist_failed,
        }
    }
}

/// 流状态总览 DTO - 对应 `GET /stream/status`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamStatusResponse {
    /// 当前连接的客户端数量
    pub client_count: usize,
    /// 当前 (client, key) 订阅对总数
    pub subscription_count: usize,
    /// 已投递成功的消息总数
    pub messages_sent: u64,
    /// 活跃证券列表
    pub active_symbols: Vec<String>,
    /// 活跃聚合器总数
    pub worker_count: usize,
    /// 行情源状态
    pub feed: FeedStatusResponse,
    /// 背压丢弃计数
    pub drops: DropCountersResponse,
}

/// 健康检查 DTO - 对应 `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" 或 "degraded"
    #[schema(example = "ok")]
    pub status: String,
    /// 行情源是否在线
    pub feed_connected: bool,
    /// 当前连接的客户端数量
    pub client_count: usize,
    /// 活跃聚合器总数
    pub worker_count: usize,
}
