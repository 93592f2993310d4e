use chrono::TimeZone;
use rosoku_cache::mem::TtlCache;
use rosoku_core::common::TimeFrame;
use rosoku_core::enrich::error::EnrichError;
use rosoku_core::enrich::port::{EnrichOptions, Enricher};
use rosoku_core::market::entity::Candle;
use rosoku_enrich::engine::EnrichEngine;
use rosoku_enrich::service::EnrichmentService;
use std::sync::Arc;
use std::time::Duration;

fn candle(i: usize, close: f64, volume: i64) -> Candle {
    Candle {
        symbol: "AAPL".to_string(),
        timeframe: TimeFrame::Minute1,
        time: chrono::Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
            + chrono::Duration::minutes(i as i64),
        open: close - 0.2,
        high: close + 0.6,
        low: close - 0.7,
        close,
        volume,
    }
}

fn history(len: usize) -> Vec<Candle> {
    (0..len)
        .map(|i| candle(i, 100.0 + (i as f64 * 0.45).sin() * 2.0 + i as f64 * 0.1, 500 + (i as i64 % 7) * 100))
        .collect()
}

fn engine() -> EnrichEngine {
    EnrichEngine::new(Arc::new(TtlCache::new(Duration::from_secs(300))))
}

#[tokio::test]
async fn test_insufficient_history_rejected() {
    let engine = engine();
    let current = candle(5, 101.0, 600);
    let result = engine
        .enrich(&current, &history(5), &EnrichOptions::default())
        .await;

    match result {
        Err(EnrichError::InsufficientHistory { have, need }) => {
            assert_eq!(have, 5);
            assert_eq!(need, 20);
        }
        other => panic!("expected InsufficientHistory, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_exact_minimum_history_succeeds() {
    let engine = engine();
    let current = candle(20, 102.0, 600);

    // 恰好等于最小历史根数必须成功
    let enriched = engine
        .enrich(&current, &history(20), &EnrichOptions::default())
        .await
        .unwrap();
    assert!(enriched.indicators.trend.is_some());

    // 少一根则失败
    let result = engine
        .enrich(&current, &history(19), &EnrichOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(EnrichError::InsufficientHistory { .. })
    ));
}

#[tokio::test]
async fn test_base_is_bit_identical() {
    let engine = engine();
    let current = candle(30, 103.5, 750);
    let enriched = engine
        .enrich(&current, &history(30), &EnrichOptions::default())
        .await
        .unwrap();
    assert_eq!(enriched.base, current);
}

#[tokio::test]
async fn test_deterministic_indicators_and_signal() {
    // 两个独立引擎 (独立缓存) 对相同输入的产出必须逐字节一致
    let current = candle(40, 104.0, 800);
    let hist = history(40);
    let options = EnrichOptions::default();

    let first = engine().enrich(&current, &hist, &options).await.unwrap();
    let second = engine().enrich(&current, &hist, &options).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&first.indicators).unwrap(),
        serde_json::to_vec(&second.indicators).unwrap()
    );
    assert_eq!(
        serde_json::to_vec(&first.signal).unwrap(),
        serde_json::to_vec(&second.signal).unwrap()
    );
    assert_eq!(first.analysis, second.analysis);
}

#[tokio::test]
async fn test_cache_memoizes_indicator_vector() {
    let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
    let engine = EnrichEngine::new(cache.clone());
    let current = candle(40, 104.0, 800);
    let hist = history(40);
    let options = EnrichOptions::default();

    let first = engine.enrich(&current, &hist, &options).await.unwrap();
    // 第二次调用命中缓存，向量逐字节一致
    let second = engine.enrich(&current, &hist, &options).await.unwrap();
    assert_eq!(
        serde_json::to_vec(&first.indicators).unwrap(),
        serde_json::to_vec(&second.indicators).unwrap()
    );

    // 缓存条目确实存在
    use rosoku_core::cache::port::Cache;
    let key = EnrichEngine::cache_key("AAPL", TimeFrame::Minute1, hist.len() + 1);
    assert!(cache.get_raw(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_zero_volume_degrades_gracefully() {
    let engine = engine();
    let hist: Vec<Candle> = (0..30).map(|i| candle(i, 100.0 + i as f64 * 0.1, 0)).collect();
    let current = candle(30, 103.0, 0);

    let enriched = engine
        .enrich(&current, &hist, &EnrichOptions::default())
        .await
        .unwrap();

    // 量能类缺省但其余类别照常产出，基础 K 线不丢
    assert!(enriched.indicators.volume.is_none());
    assert!(enriched.indicators.trend.is_some());
    assert!(
        enriched
            .meta
            .warnings
            .iter()
            .any(|w| w.contains("volume"))
    );
}

#[tokio::test]
async fn test_zero_deadline_times_out() {
    let engine = engine();
    let current = candle(30, 103.0, 600);
    let options = EnrichOptions {
        deadline: Duration::ZERO,
        ..EnrichOptions::default()
    };

    let result = engine.enrich(&current, &history(30), &options).await;
    assert!(matches!(result, Err(EnrichError::Timeout { .. })));
}

#[tokio::test]
async fn test_partial_on_timeout_returns_degraded_result() {
    let engine = engine();
    let current = candle(30, 103.0, 600);
    let options = EnrichOptions {
        deadline: Duration::ZERO,
        partial_on_timeout: true,
        ..EnrichOptions::default()
    };

    let enriched = engine
        .enrich(&current, &history(30), &options)
        .await
        .unwrap();
    assert!(enriched.meta.partial);
    assert!(!enriched.meta.warnings.is_empty());
    // 部分结果仍携带原始 K 线
    assert_eq!(enriched.base, current);
}

#[tokio::test]
async fn test_chart_patterns_disabled_by_default() {
    let engine = engine();
    let current = candle(40, 104.0, 800);
    let enriched = engine
        .enrich(&current, &history(40), &EnrichOptions::default())
        .await
        .unwrap();
    assert!(enriched.analysis.chart_patterns.is_empty());
}

/// 必然崩溃的引擎：验证服务把 panic 拦截为内部错误而非杀死协程
struct PanickingEnricher;

#[async_trait::async_trait]
impl rosoku_core::enrich::port::Enricher for PanickingEnricher {
    async fn enrich(
        &self,
        _: &Candle,
        _: &[Candle],
        _: &EnrichOptions,
    ) -> Result<rosoku_core::enrich::entity::EnrichedCandle, EnrichError> {
        panic!("index out of range in indicator kernel");
    }
}

#[tokio::test]
async fn test_service_survives_enricher_panic() {
    let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
    let mut service =
        EnrichmentService::new(Arc::new(PanickingEnricher), cache, EnrichOptions::default());

    // panic 被拦截：返回 None，调用方可继续广播原始 K 线
    assert!(service.process(&candle(0, 100.0, 500)).await.is_none());
    // 服务与窗口状态完好，后续处理继续
    assert!(service.process(&candle(1, 100.5, 500)).await.is_none());
    assert_eq!(service.window_len("AAPL", TimeFrame::Minute1), 2);
}

#[tokio::test]
async fn test_service_builds_windows_and_invalidates() {
    let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
    let engine = Arc::new(EnrichEngine::new(cache.clone()));
    let mut service = EnrichmentService::new(engine, cache, EnrichOptions::default());

    // 前 20 根均因历史不足而降级，第 21 根起可富化
    let mut enriched_count = 0;
    for i in 0..25 {
        let c = candle(i, 100.0 + i as f64 * 0.2, 600);
        if service.process(&c).await.is_some() {
            enriched_count += 1;
        }
    }
    assert_eq!(enriched_count, 5);
    assert_eq!(service.window_len("AAPL", TimeFrame::Minute1), 25);

    service.invalidate_symbol("AAPL").await;
    assert_eq!(service.window_len("AAPL", TimeFrame::Minute1), 0);
}
