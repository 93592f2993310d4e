//! # `rosoku-hub` - 订阅中枢与网关
//!
//! 本 crate 是 Rosoku 流式 K 线引擎的对外边界：
//! - 维护客户端 ↔ (symbol, timeframe) 订阅图，向订阅者扇出
//!   已收盘与已富化 K 线，慢消费者被剔除而非阻塞生产者
//! - WebSocket 客户端生命周期 (读/写循环、保活、空闲断开)
//! - HTTP 控制面 (`/stream/symbols`、`/stream/status`、`/health`)，
//!   通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档
//!
//! ## 架构职责
//! - 订阅图由中枢独占，注册/订阅/广播全部经由单一序列化入口
//! - 客户端建模为不透明句柄 (uuid + 有界出站队列)，无反向指针

pub mod client;
pub mod error;
pub mod hub;
pub mod messages;
pub mod routes;
pub mod server;
pub mod types;
