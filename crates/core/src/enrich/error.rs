use thiserror::Error;

/// # Summary
/// 富化域错误枚举。历史不足与超时导致降级而非流水线失败。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 基础 OHLCV 永远不因富化失败被丢弃。
#[derive(Error, Debug)]
pub enum EnrichError {
    // 历史窗口长度未达到最小要求
    #[error("Insufficient history: have {have}, need {need}")]
    InsufficientHistory { have: usize, need: usize },
    // 单次调用超出截止时限
    #[error("Enrichment deadline exceeded after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    // 内部缺陷，记录完整上下文后由调用方决定重启
    #[error("Internal error: {0}")]
    Internal(String),
}
