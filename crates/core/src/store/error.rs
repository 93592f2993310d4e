use thiserror::Error;

/// # Summary
/// 存储域错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - `Transient` 允许接收端退避重试；`Database` 视为永久失败。
#[derive(Error, Debug)]
pub enum StoreError {
    // 底层数据库故障 (永久)
    #[error("Database error: {0}")]
    Database(String),
    // 短暂故障，如连接池耗尽或文件锁冲突，可重试
    #[error("Transient store error: {0}")]
    Transient(String),
    // 数据编码失败
    #[error("Serialize error: {0}")]
    Serialize(String),
}
