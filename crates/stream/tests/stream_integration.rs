use chrono::{TimeZone, Utc};
use rosoku_core::common::TimeFrame;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::config::WorkerConfig;
use rosoku_core::feed::entity::MarketEvent;
use rosoku_core::market::entity::Candle;
use rosoku_stream::manager::StreamManager;
use rosoku_stream::router::EventRouter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn config(max_workers: usize) -> WorkerConfig {
    WorkerConfig {
        buffer_size: 100,
        aggregation_timeout_secs: 5,
        max_workers_per_symbol: max_workers,
        synthesize_empty: false,
    }
}

fn ts(minute: u32, second: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 12, minute, second).unwrap()
}

async fn drain(rx: &mut mpsc::Receiver<Candle>) -> Vec<Candle> {
    let mut candles = Vec::new();
    while let Ok(candle) = rx.try_recv() {
        candles.push(candle);
    }
    candles
}

#[tokio::test]
async fn test_multi_timeframe_fanout() {
    let counters = Arc::new(PipelineCounters::default());
    let router = Arc::new(EventRouter::new(counters.clone()));
    let (completed_tx, mut completed_rx) = mpsc::channel(64);
    let manager = StreamManager::new(
        router.clone(),
        completed_tx,
        config(2),
        counters,
        CancellationToken::new(),
    );

    let started = manager.add_symbol("AAPL").unwrap();
    assert_eq!(started, vec![TimeFrame::Minute1, TimeFrame::Minute5]);

    // 5 分钟内 10 笔成交，每分钟两笔
    let prices = [
        (100.0, 101.0),
        (102.0, 99.5),
        (99.0, 100.5),
        (103.0, 102.5),
        (101.5, 104.0),
    ];
    for (minute, (p1, p2)) in prices.iter().enumerate() {
        let minute = u32::try_from(minute).unwrap();
        router.route(&MarketEvent::trade("AAPL", ts(minute, 10), *p1, 10));
        router.route(&MarketEvent::trade("AAPL", ts(minute, 40), *p2, 5));
    }

    // 移除证券：收件箱关闭，聚合器冲洗尾桶后退出
    assert!(manager.remove_symbol("AAPL").await);
    let candles = drain(&mut completed_rx).await;

    let one_min: Vec<&Candle> = candles
        .iter()
        .filter(|c| c.timeframe == TimeFrame::Minute1)
        .collect();
    let five_min: Vec<&Candle> = candles
        .iter()
        .filter(|c| c.timeframe == TimeFrame::Minute5)
        .collect();

    assert_eq!(one_min.len(), 5);
    assert_eq!(five_min.len(), 1);

    // 每个键内桶起始时间严格递增
    for pair in one_min.windows(2) {
        assert!(pair[0].time < pair[1].time);
    }

    // 5m K 线必须等于 1m 序列的卷积
    let agg = five_min[0];
    assert_eq!(agg.open, one_min[0].open);
    assert_eq!(agg.close, one_min[4].close);
    let high = one_min.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = one_min.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    assert_eq!(agg.high, high);
    assert_eq!(agg.low, low);
    assert_eq!(agg.high, 104.0);
    assert_eq!(agg.low, 99.0);
    assert_eq!(agg.volume, one_min.iter().map(|c| c.volume).sum::<i64>());

    // 所有产出满足 OHLCV 不变量
    for candle in &candles {
        candle.validate().unwrap();
    }
}

#[tokio::test]
async fn test_add_symbol_is_idempotent() {
    let counters = Arc::new(PipelineCounters::default());
    let router = Arc::new(EventRouter::new(counters.clone()));
    let (completed_tx, _completed_rx) = mpsc::channel(16);
    let manager = StreamManager::new(
        router,
        completed_tx,
        config(3),
        counters,
        CancellationToken::new(),
    );

    assert_eq!(manager.add_symbol("MSFT").unwrap().len(), 3);
    // 二次加入为无操作
    assert!(manager.add_symbol("MSFT").unwrap().is_empty());
    assert_eq!(manager.worker_count(), 3);

    manager.shutdown().await;
    assert_eq!(manager.worker_count(), 0);
}

#[tokio::test]
async fn test_invalid_symbol_rejected() {
    let counters = Arc::new(PipelineCounters::default());
    let router = Arc::new(EventRouter::new(counters.clone()));
    let (completed_tx, _completed_rx) = mpsc::channel(16);
    let manager = StreamManager::new(
        router,
        completed_tx,
        config(2),
        counters,
        CancellationToken::new(),
    );

    assert!(manager.add_symbol("aapl").is_err());
    assert!(manager.add_symbol("WAYTOOLONG").is_err());
    assert!(!manager.contains("aapl"));
}

#[tokio::test]
async fn test_remove_unknown_symbol_is_noop() {
    let counters = Arc::new(PipelineCounters::default());
    let router = Arc::new(EventRouter::new(counters.clone()));
    let (completed_tx, _completed_rx) = mpsc::channel(16);
    let manager = StreamManager::new(
        router,
        completed_tx,
        config(2),
        counters,
        CancellationToken::new(),
    );

    assert!(!manager.remove_symbol("AAPL").await);
}
