use crate::history::{HistoryWindow, WINDOW_CAPACITY};
use futures::FutureExt;
use rosoku_core::cache::port::Cache;
use rosoku_core::common::TimeFrame;
use rosoku_core::enrich::entity::EnrichedCandle;
use rosoku_core::enrich::error::EnrichError;
use rosoku_core::enrich::port::{EnrichOptions, Enricher};
use rosoku_core::market::entity::Candle;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// # Summary
/// 富化应用服务：持有每键历史窗口，驱动引擎逐根富化。
///
/// # Invariants
/// - 历史窗口归本服务独占 (&mut 单写者)，外界只读。
/// - 富化失败绝不吞掉基础 K 线：调用方总能继续广播原始 K 线。
/// - 引擎内部缺陷 (panic) 在单根粒度被拦截为 `Internal` 错误并
///   记录完整上下文，流水线协程带着原有窗口继续处理下一根。
/// - `process` 先以追加前的窗口做历史、再追加当前根，
///   保证历史不含当前根自身。
pub struct EnrichmentService {
    enricher: Arc<dyn Enricher>,
    cache: Arc<dyn Cache>,
    options: EnrichOptions,
    // (symbol, timeframe) → 滚动历史
    windows: HashMap<(String, TimeFrame), HistoryWindow>,
}

impl EnrichmentService {
    /// # Summary
    /// 构造服务。
    ///
    /// # Arguments
    /// * `enricher`: 富化引擎实现。
    /// * `cache`: 指标缓存 (证券移除时做前缀失效)。
    /// * `options`: 富化选项 (截止时限、最小历史等)。
    pub fn new(enricher: Arc<dyn Enricher>, cache: Arc<dyn Cache>, options: EnrichOptions) -> Self {
        Self {
            enricher,
            cache,
            options,
            windows: HashMap::new(),
        }
    }

    /// # Summary
    /// 处理一根刚收盘的 K 线。
    ///
    /// # Logic
    /// 1. 取该键窗口快照作为历史。
    /// 2. 调用引擎富化，拦截引擎 panic 为 `Internal` 错误；
    ///    历史不足仅 debug，超时 warn，内部错误 error，
    ///    均返回 None。
    /// 3. 无论富化结果如何，当前根都追加进窗口。
    ///
    /// # Arguments
    /// * `candle`: 已收盘 K 线。
    ///
    /// # Returns
    /// 成功返回富化制品，降级路径返回 None。
    pub async fn process(&mut self, candle: &Candle) -> Option<EnrichedCandle> {
        let key = (candle.symbol.clone(), candle.timeframe);
        let window = self
            .windows
            .entry(key)
            .or_insert_with(|| HistoryWindow::new(WINDOW_CAPACITY));
        let history = window.ordered();

        let result = match AssertUnwindSafe(self.enricher.enrich(candle, &history, &self.options))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EnrichError::Internal(format!(
                    "enricher panicked on {}:{} @ {} with {} history candles: {}",
                    candle.symbol,
                    candle.timeframe,
                    candle.time,
                    history.len(),
                    reason
                )))
            }
        };
        window.push(candle.clone());

        match result {
            Ok(enriched) => Some(enriched),
            Err(EnrichError::InsufficientHistory { have, need }) => {
                debug!(
                    "Enrichment skipped for {}:{} ({}/{} candles)",
                    candle.symbol, candle.timeframe, have, need
                );
                None
            }
            Err(EnrichError::Timeout { elapsed_ms }) => {
                warn!(
                    "Enrichment deadline exceeded for {}:{} after {}ms",
                    candle.symbol, candle.timeframe, elapsed_ms
                );
                None
            }
            Err(e) => {
                error!(
                    "Enrichment failed for {}:{}: {}",
                    candle.symbol, candle.timeframe, e
                );
                None
            }
        }
    }

    /// # Summary
    /// 证券移除时丢弃其全部窗口并失效缓存前缀。
    ///
    /// # Arguments
    /// * `symbol`: 证券代码。
    pub async fn invalidate_symbol(&mut self, symbol: &str) {
        self.windows.retain(|(s, _), _| s != symbol);
        if self
            .cache
            .invalidate_prefix(&format!("ind:{}:", symbol))
            .await
            .is_err()
        {
            warn!("Cache invalidation failed for {}", symbol);
        }
    }

    /// 指定键当前窗口长度 (无窗口为 0)
    pub fn window_len(&self, symbol: &str, timeframe: TimeFrame) -> usize {
        self.windows
            .get(&(symbol.to_string(), timeframe))
            .map(|w| w.len())
            .unwrap_or(0)
    }
}
