use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 行情事件种类：逐笔成交、盘口报价或上游预聚合 K 线。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    Trade,
    Quote,
    Bar,
}

/// # Summary
/// 上游 Bar 事件随附的完整 OHLC 载荷。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BarData {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// # Summary
/// 归一化行情事件，行情源产出、路由器消费的唯一载体。
///
/// # Invariants
/// - 创建后不可变。
/// - `price` 为正；`volume` 非负。
/// - `bar` 仅在 `kind == Bar` 时存在。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketEvent {
    // 证券代码
    pub symbol: String,
    // 事件种类
    pub kind: EventKind,
    // 事件时间 (UTC，流内单调)
    pub time: DateTime<Utc>,
    // 成交价 / 报价中间价 / Bar 收盘价
    pub price: f64,
    // 成交量 (报价事件为 0)
    pub volume: i64,
    // Bar 事件的 OHLC 载荷
    pub bar: Option<BarData>,
}

impl MarketEvent {
    /// # Summary
    /// 构造一笔逐笔成交事件。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `time`: 成交时间。
    /// * `price`: 成交价。
    /// * `volume`: 成交量。
    ///
    /// # Returns
    /// 归一化事件。
    pub fn trade(symbol: impl Into<String>, time: DateTime<Utc>, price: f64, volume: i64) -> Self {
        Self {
            symbol: symbol.into(),
            kind: EventKind::Trade,
            time,
            price,
            volume,
            bar: None,
        }
    }

    /// # Summary
    /// 构造一条上游预聚合 Bar 事件。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    /// * `time`: Bar 起始时间。
    /// * `bar`: OHLC 载荷。
    /// * `volume`: 区间成交量。
    ///
    /// # Returns
    /// 归一化事件，`price` 取 Bar 收盘价。
    pub fn bar(symbol: impl Into<String>, time: DateTime<Utc>, bar: BarData, volume: i64) -> Self {
        Self {
            symbol: symbol.into(),
            kind: EventKind::Bar,
            time,
            price: bar.close,
            volume,
            bar: Some(bar),
        }
    }
}

/// # Summary
/// 行情源连接状态机。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedState {
    // 尚未启动或已停止
    Disconnected,
    // 首次建立连接中
    Connecting,
    // 已连接且完成鉴权
    Connected,
    // 连接丢失，退避重连中
    Reconnecting,
    // 鉴权失败，不再重试 (致命)
    AuthFailed,
}

/// # Summary
/// 行情源运行状态快照，供状态接口与健康检查读取。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedStatus {
    pub state: FeedState,
    pub connected: bool,
    // 自上次成功连接以来的重连尝试次数
    pub reconnect_attempts: u32,
    // 输出环溢出丢弃的事件总数
    pub dropped_events: u64,
    // 当前订阅的证券集合
    pub subscribed: Vec<String>,
}

impl FeedStatus {
    /// 以断开状态构造初始快照
    pub fn disconnected() -> Self {
        Self {
            state: FeedState::Disconnected,
            connected: false,
            reconnect_attempts: 0,
            dropped_events: 0,
            subscribed: vec![],
        }
    }
}
