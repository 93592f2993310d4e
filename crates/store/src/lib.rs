//! # `rosoku-store` - K 线持久化
//!
//! 基于 sqlx/SQLite 的 `CandleStore` 实现与尽力而为的写入汇点：
//! - [`candle::SqliteCandleStore`]：单库单表，
//!   `(symbol, timeframe, time)` 主键 upsert。
//! - [`sink::PersistSink`]：有界通道消费者，批量落库，
//!   短暂故障退避重试，永久失败计数后继续，绝不反压上游。

pub mod candle;
pub mod sink;
