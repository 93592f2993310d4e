//! # `rosoku-stream` - 聚合流水线
//!
//! 将归一化行情事件折叠为多周期 OHLCV K 线：
//! - [`router::EventRouter`]：按证券代码把事件扇出到各周期聚合器收件箱，
//!   投递永不阻塞，溢出只计数。
//! - [`worker::AggregatorWorker`]：每 (symbol, timeframe) 一个单写者协程，
//!   在桶边界或看门狗超时产出已收盘 K 线。
//! - [`manager::StreamManager`]：按证券维护工作协程注册表。

pub mod manager;
pub mod router;
pub mod worker;
