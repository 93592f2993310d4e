use thiserror::Error;

/// # Summary
/// 行情源域错误枚举，区分可重试的链路故障与致命的鉴权失败。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - `Auth` 为致命错误：适配器收到后停止重连。
#[derive(Error, Debug)]
pub enum FeedError {
    // 连接建立或链路中断，可退避重试
    #[error("Connect error: {0}")]
    Connect(String),
    // 鉴权被上游拒绝，致命
    #[error("Authentication rejected: {0}")]
    Auth(String),
    // 订阅指令被上游拒绝，记录日志但不终止适配器
    #[error("Subscribe error: {0}")]
    Subscribe(String),
    // 协议帧解析失败
    #[error("Protocol error: {0}")]
    Protocol(String),
}
