use chrono::{DateTime, Utc};
use rosoku_core::common::TimeFrame;
use rosoku_core::common::metrics::PipelineCounters;
use rosoku_core::feed::entity::{EventKind, MarketEvent};
use rosoku_core::market::entity::Candle;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 产出水位线的空值标记
pub const WATERMARK_NONE: i64 = i64::MIN;

/// # Summary
/// 形成中的 K 线累加器。归属于唯一的聚合器协程 (单写者)。
///
/// # Invariants
/// - `low ≤ open, close ≤ high` 在每次折叠后保持。
/// - `bucket_start ≤ last_update < bucket_start + timeframe`。
/// - `updates == 0` 表示该桶由看门狗以上一收盘价占位开启，
///   尚未收到任何事件，不允许作为 K 线产出。
struct OpenCandle {
    bucket_start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    last_update: DateTime<Utc>,
    updates: u32,
}

impl OpenCandle {
    /// 从首个事件初始化
    fn from_event(bucket_start: DateTime<Utc>, event: &MarketEvent) -> Self {
        Self {
            bucket_start,
            open: event.price,
            high: event.price,
            low: event.price,
            close: event.price,
            volume: event.volume.max(0),
            last_update: event.time,
            updates: 1,
        }
    }

    /// 从上游预聚合 Bar 整体替换
    fn from_bar(bucket_start: DateTime<Utc>, event: &MarketEvent) -> Option<Self> {
        let bar = event.bar?;
        Some(Self {
            bucket_start,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: event.volume.max(0),
            last_update: event.time,
            updates: 1,
        })
    }

    /// 看门狗翻桶时以上一收盘价占位开启
    fn placeholder(bucket_start: DateTime<Utc>, prev_close: f64) -> Self {
        Self {
            bucket_start,
            open: prev_close,
            high: prev_close,
            low: prev_close,
            close: prev_close,
            volume: 0,
            last_update: bucket_start,
            updates: 0,
        }
    }

    /// # Summary
    /// 折叠一个同桶事件。
    ///
    /// # Logic
    /// 1. 占位桶收到首个事件时以事件价重置四价。
    /// 2. 否则更新 high/low 极值、刷新收盘价并累加成交量。
    fn fold(&mut self, event: &MarketEvent) {
        if self.updates == 0 {
            // 占位桶：open 保持上一收盘价，价格序列从事件开始
            self.high = self.open.max(event.price);
            self.low = self.open.min(event.price);
        } else {
            self.high = self.high.max(event.price);
            self.low = self.low.min(event.price);
        }
        self.close = event.price;
        self.volume += event.volume.max(0);
        self.last_update = event.time;
        self.updates += 1;
    }

    /// 冻结为已收盘 K 线
    fn freeze(&self, symbol: &str, timeframe: TimeFrame) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe,
            time: self.bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// # Summary
/// 单键聚合器协程。独占其 OpenCandle，事件按到达顺序折叠，
/// 在桶边界或看门狗超时产出已收盘 K 线。
///
/// # Invariants
/// - 同键产出的 K 线桶起始时间严格递增 (由共享水位线把关)。
/// - 同一 (symbol, timeframe, bucket_start) 至多产出一次，
///   跨崩溃重启依然成立：水位线存活于协程之外。
/// - 输出通道满时丢弃并递增 `candle_dropped`，绝不阻塞。
pub struct AggregatorWorker {
    symbol: String,
    timeframe: TimeFrame,
    inbox: mpsc::Receiver<MarketEvent>,
    output: mpsc::Sender<Candle>,
    // 桶边界后的看门狗宽限
    grace: Duration,
    // 空桶是否合成平盘 K 线
    synthesize_empty: bool,
    counters: Arc<PipelineCounters>,
    token: CancellationToken,
    // 最近产出桶的 Unix 秒，注册表持有、重启后延续；
    // 迟到与重复桶据此丢弃
    watermark: Arc<AtomicI64>,

    current: Option<OpenCandle>,
    // 最近收盘价，供看门狗占位与空桶合成使用
    prev_close: Option<f64>,
    // 最近一次收到事件的墙钟时刻
    last_activity: tokio::time::Instant,
}

impl AggregatorWorker {
    /// # Summary
    /// 构造聚合器协程。
    ///
    /// # Arguments
    /// * `symbol` / `timeframe`: 聚合键。
    /// * `inbox`: 有界事件收件箱 (路由器写入)。
    /// * `output`: 与富化层共享的有界产出通道。
    /// * `grace`: 桶边界后的宽限时长。
    /// * `synthesize_empty`: 空桶合成开关。
    /// * `counters`: 全局计数器。
    /// * `token`: 停止信号。
    /// * `watermark`: 该键的共享产出水位线 (初始 `WATERMARK_NONE`)。
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        timeframe: TimeFrame,
        inbox: mpsc::Receiver<MarketEvent>,
        output: mpsc::Sender<Candle>,
        grace: Duration,
        synthesize_empty: bool,
        counters: Arc<PipelineCounters>,
        token: CancellationToken,
        watermark: Arc<AtomicI64>,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            inbox,
            output,
            grace,
            synthesize_empty,
            counters,
            token,
            watermark,
            current: None,
            prev_close: None,
            last_activity: tokio::time::Instant::now(),
        }
    }

    /// 读取水位线：最近产出的桶起始时间
    fn last_emitted(&self) -> Option<DateTime<Utc>> {
        let secs = self.watermark.load(Ordering::Relaxed);
        if secs == WATERMARK_NONE {
            None
        } else {
            DateTime::from_timestamp(secs, 0)
        }
    }

    /// # Summary
    /// 协程主循环：Idle → Open → Emit → Open，直到停止。
    ///
    /// # Logic
    /// 1. select 等待事件、看门狗或停止信号。
    /// 2. 收件箱关闭或收到停止信号时，冲洗当前非空桶后退出。
    pub async fn run(mut self) {
        debug!("Aggregator {}:{} started", self.symbol, self.timeframe);
        loop {
            let deadline = self.watchdog_deadline();
            tokio::select! {
                _ = self.token.cancelled() => {
                    self.flush();
                    break;
                }
                maybe = self.inbox.recv() => match maybe {
                    Some(event) => {
                        self.last_activity = tokio::time::Instant::now();
                        self.fold_event(&event);
                    }
                    None => {
                        self.flush();
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => {
                    self.on_watchdog();
                }
            }
        }
        info!("Aggregator {}:{} exited", self.symbol, self.timeframe);
    }

    /// # Summary
    /// 计算看门狗唤醒时刻。
    ///
    /// # Logic
    /// 取两者较晚：桶终点加宽限 (UTC 映射到墙钟)、最近事件到达
    /// 时刻加宽限。后者保证宽限同时约束到达间隔，历史数据回放
    /// 不会在事件仍在路上时提前收盘。
    ///
    /// # Returns
    /// 无形成中 K 线时返回 None (看门狗停用)。
    fn watchdog_deadline(&self) -> Option<tokio::time::Instant> {
        let current = self.current.as_ref()?;
        let bucket_end = current.bucket_start
            + chrono::Duration::seconds(self.timeframe.duration_secs())
            + chrono::Duration::from_std(self.grace).unwrap_or_default();
        let wait_ms = (bucket_end - Utc::now()).num_milliseconds().max(0);
        let by_clock = tokio::time::Instant::now() + Duration::from_millis(wait_ms.unsigned_abs());
        let by_arrival = self.last_activity + self.grace;
        Some(by_clock.max(by_arrival))
    }

    /// # Summary
    /// 折叠一个入站事件。
    ///
    /// # Logic
    /// 1. 计算事件所属桶；落在已产出桶内的迟到事件直接丢弃。
    /// 2. Bar 事件整体替换其桶的累加器。
    /// 3. 同桶事件折叠；新桶事件先产出旧桶再开新桶。
    fn fold_event(&mut self, event: &MarketEvent) {
        let bucket = self.timeframe.bucket_start(event.time);

        if let Some(last) = self.last_emitted()
            && bucket <= last
        {
            debug!(
                "Late event for closed bucket {} on {}:{}, dropped",
                bucket, self.symbol, self.timeframe
            );
            return;
        }

        let position = self
            .current
            .as_ref()
            .map(|current| bucket.cmp(&current.bucket_start));

        if event.kind == EventKind::Bar {
            match position {
                Some(std::cmp::Ordering::Less) => {
                    // 事件时间早于形成中的桶：上游乱序，丢弃
                    debug!(
                        "Out-of-order bar before open bucket on {}:{}, dropped",
                        self.symbol, self.timeframe
                    );
                    return;
                }
                Some(std::cmp::Ordering::Greater) => self.emit_current(),
                _ => {}
            }
            // 同桶或新桶：Bar 直接替换累加器
            if let Some(replaced) = OpenCandle::from_bar(bucket, event) {
                self.current = Some(replaced);
            }
            return;
        }

        match position {
            None => {
                self.current = Some(OpenCandle::from_event(bucket, event));
            }
            Some(std::cmp::Ordering::Equal) => {
                if let Some(current) = self.current.as_mut() {
                    current.fold(event);
                }
            }
            Some(std::cmp::Ordering::Greater) => {
                // 事件驱动翻桶：产出旧桶，新桶由事件初始化。
                // 中间缺失的桶不回填，由看门狗按配置决定是否合成。
                self.emit_current();
                self.current = Some(OpenCandle::from_event(bucket, event));
            }
            Some(std::cmp::Ordering::Less) => {
                debug!(
                    "Out-of-order event before open bucket on {}:{}, dropped",
                    self.symbol, self.timeframe
                );
            }
        }
    }

    /// # Summary
    /// 产出当前桶 (事件驱动翻桶)。空桶跳过，不产出空 K 线。
    fn emit_current(&mut self) {
        if let Some(current) = self.current.take() {
            if current.updates > 0 {
                self.emit(&current);
            }
        }
    }

    /// # Summary
    /// 看门狗触发：桶终点加宽限仍无事件，强制收盘并顺移下一桶。
    ///
    /// # Logic
    /// 1. 非空桶正常产出；空占位桶按 `synthesize_empty` 决定
    ///    合成平盘 K 线或静默跳过。
    /// 2. 以上一收盘价占位开启紧随其后的桶。
    fn on_watchdog(&mut self) {
        let Some(current) = self.current.take() else {
            return;
        };
        let next_start =
            current.bucket_start + chrono::Duration::seconds(self.timeframe.duration_secs());

        if current.updates > 0 {
            self.emit(&current);
        } else if self.synthesize_empty && self.prev_close.is_some() {
            // 合成平盘 K 线: open=high=low=close=上一收盘, volume=0
            self.emit(&current);
        }

        let close = self.prev_close.unwrap_or(current.close);
        self.current = Some(OpenCandle::placeholder(next_start, close));
        self.last_activity = tokio::time::Instant::now();
    }

    /// # Summary
    /// 冲洗当前非空桶 (停止路径)。
    fn flush(&mut self) {
        if let Some(current) = self.current.take()
            && current.updates > 0
        {
            self.emit(&current);
        }
    }

    /// # Summary
    /// 产出一根已收盘 K 线。
    ///
    /// # Logic
    /// 1. 水位线把关单调性：重复或回退的桶拒绝产出。
    /// 2. 非阻塞投递；通道满视为最高严重级丢失，计数并告警。
    fn emit(&mut self, candle: &OpenCandle) {
        if let Some(last) = self.last_emitted()
            && candle.bucket_start <= last
        {
            debug!(
                "Duplicate bucket {} suppressed on {}:{}",
                candle.bucket_start, self.symbol, self.timeframe
            );
            return;
        }

        let frozen = candle.freeze(&self.symbol, self.timeframe);
        self.watermark
            .store(candle.bucket_start.timestamp(), Ordering::Relaxed);
        self.prev_close = Some(candle.close);

        match self.output.try_send(frozen) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(candle)) => {
                PipelineCounters::incr(&self.counters.candle_dropped);
                error!(
                    "Completed candle dropped, enrichment channel full: {}:{} @ {}",
                    candle.symbol, candle.timeframe, candle.time
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    "Enrichment channel closed, candle discarded on {}:{}",
                    self.symbol, self.timeframe
                );
            }
        }
    }
}

fn far_future() -> tokio::time::Instant {
    tokio::time::Instant::now() + Duration::from_secs(86_400)
}
