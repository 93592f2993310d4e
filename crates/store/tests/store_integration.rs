use chrono::TimeZone;
use rosoku_core::common::TimeFrame;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::market::entity::Candle;
use rosoku_core::store::error::StoreError;
use rosoku_core::store::port::CandleStore;
use rosoku_store::candle::SqliteCandleStore;
use rosoku_store::sink::PersistSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn candle(minute: u32, close: f64) -> Candle {
    Candle {
        symbol: "AAPL".to_string(),
        timeframe: TimeFrame::Minute1,
        time: chrono::Utc
            .with_ymd_and_hms(2026, 3, 2, 12, minute, 0)
            .unwrap(),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 100,
    }
}

#[tokio::test]
async fn test_insert_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCandleStore::open(dir.path()).await.unwrap();

    let candles: Vec<Candle> = (0..5).map(|i| candle(i, 100.0 + f64::from(i))).collect();
    store.insert_candles(&candles).await.unwrap();

    let loaded = store
        .load_candles(
            "AAPL",
            TimeFrame::Minute1,
            candles[0].time,
            candles[4].time,
        )
        .await
        .unwrap();

    assert_eq!(loaded.len(), 5);
    assert_eq!(loaded, candles);
}

#[tokio::test]
async fn test_upsert_on_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCandleStore::open(dir.path()).await.unwrap();

    let original = candle(0, 100.0);
    store.insert_candles(&[original.clone()]).await.unwrap();

    // 同主键重写为幂等覆盖
    let mut updated = original.clone();
    updated.close = 105.0;
    updated.volume = 999;
    store.insert_candles(&[updated.clone()]).await.unwrap();

    let loaded = store
        .load_candles("AAPL", TimeFrame::Minute1, original.time, original.time)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].close, 105.0);
    assert_eq!(loaded[0].volume, 999);
}

#[tokio::test]
async fn test_load_filters_by_key_and_range() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCandleStore::open(dir.path()).await.unwrap();

    let mut other = candle(0, 50.0);
    other.symbol = "MSFT".to_string();
    store
        .insert_candles(&[candle(0, 100.0), candle(1, 101.0), candle(2, 102.0), other])
        .await
        .unwrap();

    let loaded = store
        .load_candles(
            "AAPL",
            TimeFrame::Minute1,
            candle(1, 0.0).time,
            candle(2, 0.0).time,
        )
        .await
        .unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(loaded.iter().all(|c| c.symbol == "AAPL"));
}

#[tokio::test]
async fn test_sink_persists_and_drains_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteCandleStore::open(dir.path()).await.unwrap());
    let counters = Arc::new(PipelineCounters::default());
    let token = CancellationToken::new();

    let (tx, rx) = mpsc::channel(128);
    let sink = PersistSink::new(store.clone(), rx, counters.clone(), token.clone());
    let handle = tokio::spawn(sink.run());

    for i in 0..10 {
        tx.send(candle(i, 100.0 + f64::from(i))).await.unwrap();
    }
    drop(tx);
    handle.await.unwrap();

    let loaded = store
        .load_candles(
            "AAPL",
            TimeFrame::Minute1,
            candle(0, 0.0).time,
            candle(9, 0.0).time,
        )
        .await
        .unwrap();
    assert_eq!(loaded.len(), 10);
    assert_eq!(counters.snapshot().persist_failed, 0);
}

/// 永远失败的存储：验证永久失败只计数不阻塞
struct FailingStore {
    attempts: AtomicU32,
}

#[async_trait::async_trait]
impl CandleStore for FailingStore {
    async fn insert_candles(&self, _: &[Candle]) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::Database("disk on fire".to_string()))
    }

    async fn load_candles(
        &self,
        _: &str,
        _: TimeFrame,
        _: chrono::DateTime<chrono::Utc>,
        _: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Candle>, StoreError> {
        Ok(vec![])
    }
}

#[tokio::test]
async fn test_sink_counts_permanent_failures() {
    let store = Arc::new(FailingStore {
        attempts: AtomicU32::new(0),
    });
    let counters = Arc::new(PipelineCounters::default());
    let token = CancellationToken::new();

    let (tx, rx) = mpsc::channel(16);
    let sink = PersistSink::new(store.clone(), rx, counters.clone(), token);
    let handle = tokio::spawn(sink.run());

    tx.send(candle(0, 100.0)).await.unwrap();
    tx.send(candle(1, 101.0)).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    // 永久错误不重试，批内每根都计入失败
    assert_eq!(counters.snapshot().persist_failed, 2);
    assert!(store.attempts.load(Ordering::Relaxed) >= 1);
}
