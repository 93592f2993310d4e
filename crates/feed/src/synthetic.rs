use crate::output::wrap_output;
use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rosoku_core::common::TimeFrame;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::common::time::TimeProvider;
use rosoku_core::feed::entity::{BarData, FeedState, FeedStatus, MarketEvent};
use rosoku_core::feed::error::FeedError;
use rosoku_core::feed::port::{EventStream, FeedAdapter};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// # Summary
/// 单个证券的随机游走状态。
///
/// # Invariants
/// - RNG 由全局种子与证券代码派生，序列完全确定。
struct WalkState {
    rng: SmallRng,
    last_close: f64,
}

impl WalkState {
    /// # Summary
    /// 以种子与证券代码派生游走状态，初始价落在 [50, 500)。
    fn seeded(seed: u64, symbol: &str) -> Self {
        let salt = symbol
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let mut rng = SmallRng::seed_from_u64(seed ^ salt);
        let last_close = rng.random_range(50.0..500.0);
        Self { rng, last_close }
    }

    /// # Summary
    /// 产出下一根 OHLC 自洽的合成 Bar。
    ///
    /// # Logic
    /// 1. open 取上一收盘价 (首根取初始价)。
    /// 2. close 在 open 基础上做 ±0.5% 漂移。
    /// 3. high/low 在实体两侧加非负影线，保证
    ///    `low ≤ open, close ≤ high`。
    /// 4. volume 均匀取自 [100, 10000)。
    ///
    /// # Returns
    /// (OHLC 载荷, 成交量)。
    fn next_bar(&mut self) -> (BarData, i64) {
        let open = self.last_close;
        let drift: f64 = self.rng.random_range(-0.005..0.005);
        let close = (open * (1.0 + drift)).max(0.01);

        let body_high = open.max(close);
        let body_low = open.min(close);
        let wick_up: f64 = self.rng.random_range(0.0..0.002);
        let wick_down: f64 = self.rng.random_range(0.0..0.002);

        let bar = BarData {
            open,
            high: body_high * (1.0 + wick_up),
            low: (body_low * (1.0 - wick_down)).max(0.01),
            close,
        };
        let volume = self.rng.random_range(100..10_000);

        self.last_close = close;
        (bar, volume)
    }
}

/// # Summary
/// 确定性合成行情发生器。以桶边界为节拍产出 1 分钟 Bar 事件，
/// 时间轴按 `speed_multiplier` 压缩。
///
/// # Invariants
/// - 相同 (seed, 订阅集合, 节拍数) 产出逐字节一致的事件序列。
/// - Bar 时间戳对齐到分钟栅格，且随节拍严格递增。
/// - 产出的每根 Bar 满足 OHLC 一致性与非负成交量。
pub struct SyntheticFeed {
    // 时间压缩倍率：60 / multiplier 秒产出一根分钟 Bar
    speed_multiplier: f64,
    // 全局随机种子
    seed: u64,
    // 时钟源，测试时可注入虚拟时钟
    clock: Arc<dyn TimeProvider>,
    // 有界输出环发送端
    events_tx: broadcast::Sender<MarketEvent>,
    // 当前订阅集，发生器每个节拍读取一次快照
    subscribed: Arc<Mutex<BTreeSet<String>>>,
    // 连接状态 (合成源只有 Disconnected / Connected 两态)
    state: Arc<Mutex<FeedState>>,
    counters: Arc<PipelineCounters>,
    token: CancellationToken,
}

impl SyntheticFeed {
    /// # Summary
    /// 创建合成行情发生器。
    ///
    /// # Arguments
    /// * `speed_multiplier`: 正的时间压缩倍率。
    /// * `seed`: 随机种子，决定全部价格序列。
    /// * `clock`: 时间供给器，决定首根 Bar 的栅格锚点。
    /// * `counters`: 全局流水线计数器。
    /// * `token`: 停止信号。
    pub fn new(
        speed_multiplier: f64,
        seed: u64,
        clock: Arc<dyn TimeProvider>,
        counters: Arc<PipelineCounters>,
        token: CancellationToken,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(crate::OUTPUT_CAPACITY);
        Self {
            speed_multiplier,
            seed,
            clock,
            events_tx,
            subscribed: Arc::new(Mutex::new(BTreeSet::new())),
            state: Arc::new(Mutex::new(FeedState::Disconnected)),
            counters,
            token,
        }
    }
}

#[async_trait]
impl FeedAdapter for SyntheticFeed {
    /// # Summary
    /// 启动发生器协程。重复调用为无操作。
    async fn start(&self) -> Result<(), FeedError> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| FeedError::Connect("state poisoned".to_string()))?;
            if *state == FeedState::Connected {
                return Ok(());
            }
            *state = FeedState::Connected;
        }

        let tick = Duration::from_secs_f64(60.0 / self.speed_multiplier);
        // 首根 Bar 锚定到当前分钟栅格
        let mut logical_time = TimeFrame::Minute1.bucket_start(self.clock.now());

        let events_tx = self.events_tx.clone();
        let subscribed = self.subscribed.clone();
        let seed = self.seed;
        let token = self.token.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            info!("Synthetic feed started, one bar every {:?}", tick);
            let mut walks: HashMap<String, WalkState> = HashMap::new();
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let symbols: Vec<String> = subscribed
                            .lock()
                            .map(|s| s.iter().cloned().collect())
                            .unwrap_or_default();
                        for symbol in symbols {
                            let walk = walks
                                .entry(symbol.clone())
                                .or_insert_with(|| WalkState::seeded(seed, &symbol));
                            let (bar, volume) = walk.next_bar();
                            // 无订阅者时发送失败是正常情况
                            let _ = events_tx.send(MarketEvent::bar(symbol, logical_time, bar, volume));
                        }
                        logical_time += chrono::Duration::seconds(TimeFrame::Minute1.duration_secs());
                    }
                }
            }

            if let Ok(mut s) = state.lock() {
                *s = FeedState::Disconnected;
            }
            info!("Synthetic feed stopped");
        });

        Ok(())
    }

    async fn stop(&self) {
        self.token.cancel();
    }

    /// # Summary
    /// 加入订阅集。发生器下个节拍即开始为新代码产出 Bar。幂等。
    async fn subscribe(&self, symbols: &[String]) -> Result<(), FeedError> {
        let mut set = self
            .subscribed
            .lock()
            .map_err(|_| FeedError::Subscribe("subscription set poisoned".to_string()))?;
        for s in symbols {
            set.insert(s.clone());
        }
        Ok(())
    }

    /// # Summary
    /// 移出订阅集。幂等。
    async fn unsubscribe(&self, symbols: &[String]) -> Result<(), FeedError> {
        let mut set = self
            .subscribed
            .lock()
            .map_err(|_| FeedError::Subscribe("subscription set poisoned".to_string()))?;
        for s in symbols {
            set.remove(s);
        }
        Ok(())
    }

    fn output(&self) -> EventStream {
        wrap_output(self.events_tx.subscribe(), self.counters.clone())
    }

    fn status(&self) -> FeedStatus {
        let state = self
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(FeedState::Disconnected);
        FeedStatus {
            state,
            connected: state == FeedState::Connected,
            reconnect_attempts: 0,
            dropped_events: self
                .counters
                .feed_dropped
                .load(std::sync::atomic::Ordering::Relaxed),
            subscribed: self
                .subscribed
                .lock()
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_bars_are_ohlc_consistent() {
        let mut walk = WalkState::seeded(42, "AAPL");
        for _ in 0..500 {
            let (bar, volume) = walk.next_bar();
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.high >= bar.open.max(bar.close));
            assert!(bar.low > 0.0);
            assert!(volume >= 100);
        }
    }

    #[test]
    fn test_walk_is_deterministic_per_seed() {
        let mut a = WalkState::seeded(7, "MSFT");
        let mut b = WalkState::seeded(7, "MSFT");
        for _ in 0..100 {
            assert_eq!(a.next_bar(), b.next_bar());
        }
    }

    #[test]
    fn test_walk_differs_across_symbols() {
        let mut a = WalkState::seeded(7, "MSFT");
        let mut b = WalkState::seeded(7, "AAPL");
        let (bar_a, _) = a.next_bar();
        let (bar_b, _) = b.next_bar();
        assert_ne!(bar_a, bar_b);
    }

    #[test]
    fn test_bars_open_at_previous_close() {
        let mut walk = WalkState::seeded(1, "GOOG");
        let (first, _) = walk.next_bar();
        let (second, _) = walk.next_bar();
        assert_eq!(second.open, first.close);
    }
}
