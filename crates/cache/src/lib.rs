//! # `rosoku-cache` - 指标记忆化缓存
//!
//! 基于 DashMap 的带 TTL 内存 KV 实现，承载富化引擎的指标向量
//! 记忆化。缓存命中只是优化：任何 miss 都由上游重算弥补。

pub mod mem;
