use crate::indicators::{momentum, trend, volatility, volume};
use crate::{levels, patterns, regime, signal};
use async_trait::async_trait;
use chrono::Utc;
use rosoku_core::cache::port::{Cache, CacheExt};
use rosoku_core::common::TimeFrame;
use rosoku_core::enrich::entity::{
    AnalysisReport, EnrichedCandle, EnrichmentMeta, IndicatorVector,
};
use rosoku_core::enrich::error::EnrichError;
use rosoku_core::enrich::port::{EnrichOptions, Enricher};
use rosoku_core::market::entity::Candle;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// # Summary
/// 富化引擎实现：指标计算 + 形态/阶段/级别分析 + 信号融合。
///
/// # Invariants
/// - 相同输入产出逐字节一致的 (indicators, signal, confidence)。
/// - 指标向量按 (symbol, timeframe, 窗口长度) 记忆化；缓存 miss
///   一律重算，缓存永不参与正确性。
/// - 截止时限在阶段间协作式检查；超时按选项降级或报错。
pub struct EnrichEngine {
    cache: Arc<dyn Cache>,
}

impl EnrichEngine {
    /// # Summary
    /// 以注入的缓存实现构造引擎。
    ///
    /// # Arguments
    /// * `cache`: 指标记忆化缓存 (TTL 由缓存实现配置)。
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// 指标缓存键：`ind:{symbol}:{timeframe}:{窗口长度}`
    pub fn cache_key(symbol: &str, timeframe: TimeFrame, candle_count: usize) -> String {
        format!("ind:{}:{}:{}", symbol, timeframe, candle_count)
    }

    /// # Summary
    /// 截止时限协作检查。
    ///
    /// # Returns
    /// 未超时返回 Ok(false)；超时且允许部分结果返回 Ok(true)
    /// (调用方跳过剩余阶段)；否则返回 Timeout 错误。
    fn deadline_guard(
        started: Instant,
        options: &EnrichOptions,
        partial: &mut bool,
        warnings: &mut Vec<String>,
    ) -> Result<bool, EnrichError> {
        let elapsed = started.elapsed();
        if elapsed < options.deadline {
            return Ok(false);
        }
        if options.partial_on_timeout {
            if !*partial {
                *partial = true;
                warnings.push("deadline exceeded, remaining stages skipped".to_string());
            }
            Ok(true)
        } else {
            Err(EnrichError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
            })
        }
    }
}

#[async_trait]
impl Enricher for EnrichEngine {
    /// # Summary
    /// 富化一根刚收盘的 K 线。
    ///
    /// # Logic
    /// 1. 校验历史长度，不足直接拒绝。
    /// 2. 按 (symbol, timeframe, 窗口长度) 查缓存；miss 则依次计算
    ///    四个指标类别，阶段间检查截止时限，完整向量回填缓存。
    /// 3. 单类计算不出 (数据退化) 时省略该类并记录告警。
    /// 4. 运行蜡烛形态、可选图表形态、阶段分类与级别聚类。
    /// 5. 融合信号并组装元数据。
    async fn enrich(
        &self,
        current: &Candle,
        history: &[Candle],
        options: &EnrichOptions,
    ) -> Result<EnrichedCandle, EnrichError> {
        let started = Instant::now();

        if history.len() < options.min_history {
            return Err(EnrichError::InsufficientHistory {
                have: history.len(),
                need: options.min_history,
            });
        }

        let mut window = history.to_vec();
        window.push(current.clone());
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();

        let mut warnings = Vec::new();
        let mut partial = false;

        let key = Self::cache_key(&current.symbol, current.timeframe, window.len());
        let cached: Option<IndicatorVector> = self.cache.get(&key).await.ok().flatten();
        let indicators = match cached {
            Some(vector) => {
                debug!("Indicator cache hit for {}", key);
                vector
            }
            None => {
                let mut vector = IndicatorVector::default();
                'stages: {
                    vector.trend = trend::compute(&closes);
                    if Self::deadline_guard(started, options, &mut partial, &mut warnings)? {
                        break 'stages;
                    }
                    vector.momentum = momentum::compute(&window);
                    if Self::deadline_guard(started, options, &mut partial, &mut warnings)? {
                        break 'stages;
                    }
                    vector.volatility = volatility::compute(&window);
                    if Self::deadline_guard(started, options, &mut partial, &mut warnings)? {
                        break 'stages;
                    }
                    vector.volume = volume::compute(&window);
                }
                // 不完整的向量不回填，避免被后续调用当作完整结果
                if !partial && self.cache.put(&key, &vector).await.is_err() {
                    debug!("Indicator cache write failed for {}", key);
                }
                vector
            }
        };

        // 单类降级告警
        if indicators.trend.is_none() {
            warnings.push("trend indicators unavailable for this window".to_string());
        }
        if indicators.momentum.is_none() {
            warnings.push("momentum indicators unavailable for this window".to_string());
        }
        if indicators.volatility.is_none() {
            warnings.push("volatility indicators unavailable for this window".to_string());
        }
        if indicators.volume.is_none() {
            warnings.push("volume indicators unavailable for this window".to_string());
        }

        let mut analysis = AnalysisReport::default();
        if !Self::deadline_guard(started, options, &mut partial, &mut warnings)? {
            analysis.patterns = patterns::scan(&window);
        }
        if options.chart_patterns
            && !Self::deadline_guard(started, options, &mut partial, &mut warnings)?
        {
            analysis.chart_patterns = patterns::scan_chart(&window);
        }
        if !Self::deadline_guard(started, options, &mut partial, &mut warnings)? {
            analysis.regime = regime::classify(&window);
        }
        if !Self::deadline_guard(started, options, &mut partial, &mut warnings)? {
            analysis.levels = levels::detect(&window);
        }

        let signal = signal::fuse(&indicators, &analysis.patterns);
        if signal.is_none() {
            warnings.push("signal fusion skipped: no usable indicator categories".to_string());
        }

        Ok(EnrichedCandle {
            base: current.clone(),
            indicators,
            analysis,
            signal,
            meta: EnrichmentMeta {
                computed_at: Utc::now(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                warnings,
                partial,
            },
        })
    }
}
