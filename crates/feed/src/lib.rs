//! # `rosoku-feed` - 行情源适配器
//!
//! 提供 `FeedAdapter` 端口的两个实现：
//! - [`alpaca::AlpacaFeed`]：对接上游 WebSocket 行情网关 (JSON 帧协议，
//!   Key/Secret 鉴权)，断线后指数退避重连并重放订阅集。
//! - [`synthetic::SyntheticFeed`]：确定性合成 Bar 发生器，按桶边界节拍
//!   产出 OHLC 自洽的行情，用于测试与演示。
//!
//! 两者共用同一个有界输出环 (容量 10000，覆盖最旧未读事件并计数)。

pub mod alpaca;
pub mod backoff;
pub mod output;
pub mod synthetic;

/// 输出环容量：溢出时覆盖最旧未读事件
pub(crate) const OUTPUT_CAPACITY: usize = 10_000;
