use thiserror::Error;

/// # Summary
/// 聚合流水线域错误枚举，覆盖入参校验与注册表容量限制。
/// 背压丢弃不在此列：溢出只计数，永不作为错误抛出。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum StreamError {
    // 证券代码不满足 1-5 位大写字母
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
    // 周期字符串不在受支持集合内
    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),
    // 单证券并行周期数达到配置上限
    #[error("Worker limit reached for {symbol}: {limit}")]
    WorkerLimit { symbol: String, limit: usize },
}
