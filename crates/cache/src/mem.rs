use async_trait::async_trait;
use dashmap::DashMap;
use rosoku_core::cache::error::CacheError;
use rosoku_core::cache::port::Cache;
use std::time::{Duration, Instant};

/// # Summary
/// 单个缓存条目：载荷字节与过期时刻。
struct Entry {
    // 过期时刻，超过即视为 miss
    expires_at: Instant,
    // 载荷字节
    value: Vec<u8>,
}

/// # Summary
/// 基于 DashMap 的带 TTL 内存缓存实现。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 过期条目在读取路径上惰性回收，不运行后台清扫协程。
/// - 不限制容量；容量由键空间 (symbol × timeframe × 窗口长度) 自然有界。
pub struct TtlCache {
    // 线程安全的 KV 存储容器
    storage: DashMap<String, Entry>,
    // 条目统一存活时长
    ttl: Duration,
}

impl TtlCache {
    /// # Summary
    /// 以指定 TTL 创建缓存实例。
    ///
    /// # Arguments
    /// * `ttl`: 条目写入后的存活时长。
    ///
    /// # Returns
    /// 初始化后的 TtlCache。
    pub fn new(ttl: Duration) -> Self {
        Self {
            storage: DashMap::new(),
            ttl,
        }
    }

    /// # Summary
    /// 当前存活条目数 (仅供测试观察)。
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.storage.len()
    }
}

#[async_trait]
impl Cache for TtlCache {
    /// # Summary
    /// 写入原始字节数据。
    ///
    /// # Logic
    /// 以当前时刻加 TTL 作为过期时刻，与载荷一并插入哈希表。
    /// 同名键覆盖并重置过期时刻。
    ///
    /// # Arguments
    /// * `key`: 唯一索引。
    /// * `value`: 待存入的字节序列。
    ///
    /// # Returns
    /// 始终返回 Ok，除非内存分配失败。
    async fn put_raw(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.storage.insert(
            key.to_string(),
            Entry {
                expires_at: Instant::now() + self.ttl,
                value,
            },
        );
        Ok(())
    }

    /// # Summary
    /// 读取原始字节数据。
    ///
    /// # Logic
    /// 1. 检索键对应条目。
    /// 2. 已过期则原子移除并返回 None。
    /// 3. 存活则克隆载荷返回。
    ///
    /// # Arguments
    /// * `key`: 唯一索引。
    ///
    /// # Returns
    /// 命中返回克隆的数据，miss 或过期返回 None。
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let expired = match self.storage.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.storage.remove(key);
        }
        Ok(None)
    }

    /// # Summary
    /// 删除指定键。
    ///
    /// # Arguments
    /// * `key`: 待删除的唯一索引。
    ///
    /// # Returns
    /// 无论键是否存在均返回 Ok。
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.storage.remove(key);
        Ok(())
    }

    /// # Summary
    /// 删除全部以给定前缀开头的键。
    ///
    /// # Logic
    /// 对整表做一次保留性扫描，移除前缀匹配的条目。
    ///
    /// # Arguments
    /// * `prefix`: 键前缀。
    ///
    /// # Returns
    /// 被删除的条目数量。
    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let before = self.storage.len();
        self.storage.retain(|k, _| !k.starts_with(prefix));
        Ok(before.saturating_sub(self.storage.len()))
    }
}
