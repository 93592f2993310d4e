use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rosoku_core::common::TimeFrame;
use rosoku_core::market::entity::Candle;
use rosoku_core::store::error::StoreError;
use rosoku_core::store::port::CandleStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// # Summary
/// CandleStore 的 SQLite 实现。全部证券共用单库单表，
/// `(symbol, timeframe, time)` 为主键。
///
/// # Invariants
/// - 重复写入同一主键为幂等覆盖 (upsert)，并刷新 `updated_at`。
/// - 批量写入在单事务内完成，任一根失败整批回滚。
pub struct SqliteCandleStore {
    pool: SqlitePool,
}

impl SqliteCandleStore {
    /// # Summary
    /// 在指定数据目录下打开 (或创建) K 线库。
    ///
    /// # Logic
    /// 1. 确保数据目录存在。
    /// 2. 以 `create_if_missing` 打开 `candles.db` 连接池。
    /// 3. 执行建表 SQL。
    ///
    /// # Arguments
    /// * `data_dir`: 数据根目录 (由 DI 容器显式注入)。
    ///
    /// # Returns
    /// 存储实例或 StoreError。
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Database(e.to_string()))?;
        }
        let db_path = data_dir.join("candles.db");

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                time DATETIME NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                PRIMARY KEY (symbol, timeframe, time)
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    /// # Summary
    /// 批量 upsert 已收盘 K 线。
    ///
    /// # Logic
    /// 1. 开启事务。
    /// 2. 逐根执行 `INSERT ... ON CONFLICT DO UPDATE`，
    ///    冲突时覆盖 OHLCV 并刷新 `updated_at`。
    /// 3. 提交事务；任一步失败整批回滚。
    ///
    /// # Arguments
    /// * `candles`: 待写入批次。
    ///
    /// # Returns
    /// 成功返回 Ok；连接池获取失败归为 Transient，其余为 Database。
    async fn insert_candles(&self, candles: &[Candle]) -> Result<(), StoreError> {
        if candles.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;

        let now = Utc::now();
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (symbol, timeframe, time, open, high, low, close, volume, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (symbol, timeframe, time) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&candle.symbol)
            .bind(candle.timeframe.to_string())
            .bind(candle.time)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// # Summary
    /// 读取指定键在闭区间内的历史 K 线，按时间升序。
    async fn load_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, timeframe, time, open, high, low, close, volume
            FROM candles
            WHERE symbol = ? AND timeframe = ? AND time >= ? AND time <= ?
            ORDER BY time ASC
            "#,
        )
        .bind(symbol)
        .bind(timeframe.to_string())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let tf: String = row.get("timeframe");
                Ok(Candle {
                    symbol: row.get("symbol"),
                    timeframe: TimeFrame::from_str(&tf)
                        .map_err(StoreError::Serialize)?,
                    time: row.get("time"),
                    open: row.get("open"),
                    high: row.get("high"),
                    low: row.get("low"),
                    close: row.get("close"),
                    volume: row.get("volume"),
                })
            })
            .collect()
    }
}
