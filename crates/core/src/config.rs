use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Summary
/// 配置校验错误。任何字段越界都视为启动期致命错误。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub enrichment: EnrichmentConfig,
    pub cache: CacheConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

/// # Summary
/// 聚合器工作协程配置。
///
/// # Invariants
/// - `buffer_size` 取值范围 [100, 10000]。
/// - `aggregation_timeout_secs` 取值范围 [1, 60]。
/// - `max_workers_per_symbol` 取值范围 [1, 10]。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    // 每个聚合器收件箱容量
    pub buffer_size: usize,
    // 桶边界后的宽限秒数，看门狗超时即强制收盘
    pub aggregation_timeout_secs: u64,
    // 单个证券允许并行的周期数上限
    pub max_workers_per_symbol: usize,
    // 空桶是否合成平盘 K 线 (open=high=low=close=上一收盘, volume=0)
    pub synthesize_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    // 单次富化调用的截止时限 (毫秒)
    pub timeout_ms: u64,
    // 指标计算要求的最少历史根数
    pub min_history_periods: usize,
    // 是否启用咨询性的图表形态识别
    pub chart_patterns: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    // 指标缓存条目的存活分钟数
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    // 是否使用内置合成行情发生器
    pub use_mock: bool,
    // 合成发生器的时间加速倍率
    pub speed_multiplier: f64,
    // 上游行情网关地址
    pub ws_url: String,
    // 上游鉴权 Key
    pub api_key: String,
    // 上游鉴权 Secret
    pub api_secret: String,
    // 启动时自动接入的证券列表
    pub symbols: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                data_dir: "data".to_string(),
            },
            worker: WorkerConfig {
                buffer_size: 1000,
                aggregation_timeout_secs: 5,
                max_workers_per_symbol: 7,
                synthesize_empty: false,
            },
            enrichment: EnrichmentConfig {
                timeout_ms: 1000,
                min_history_periods: 20,
                chart_patterns: false,
            },
            cache: CacheConfig { ttl_minutes: 5 },
            feed: FeedConfig {
                use_mock: true,
                speed_multiplier: 1.0,
                ws_url: "wss://stream.data.alpaca.markets/v2/iex".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                symbols: vec![],
            },
        }
    }
}

impl AppConfig {
    /// # Summary
    /// 校验各字段是否落在允许区间内。
    ///
    /// # Logic
    /// 1. 逐项检查 worker 边界值。
    /// 2. 检查富化与行情源配置的基本合法性。
    /// 3. 任意一项越界立即返回第一条错误。
    ///
    /// # Returns
    /// 全部合法返回 Ok，否则返回 `ConfigError::Invalid`。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=10_000).contains(&self.worker.buffer_size) {
            return Err(ConfigError::Invalid(format!(
                "worker.buffer_size must be in 100..=10000, got {}",
                self.worker.buffer_size
            )));
        }
        if !(1..=60).contains(&self.worker.aggregation_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "worker.aggregation_timeout_secs must be in 1..=60, got {}",
                self.worker.aggregation_timeout_secs
            )));
        }
        if !(1..=10).contains(&self.worker.max_workers_per_symbol) {
            return Err(ConfigError::Invalid(format!(
                "worker.max_workers_per_symbol must be in 1..=10, got {}",
                self.worker.max_workers_per_symbol
            )));
        }
        if self.enrichment.min_history_periods == 0 {
            return Err(ConfigError::Invalid(
                "enrichment.min_history_periods must be positive".to_string(),
            ));
        }
        if self.feed.speed_multiplier <= 0.0 || !self.feed.speed_multiplier.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "feed.speed_multiplier must be a positive finite number, got {}",
                self.feed.speed_multiplier
            )));
        }
        if !self.feed.use_mock && (self.feed.api_key.is_empty() || self.feed.api_secret.is_empty())
        {
            return Err(ConfigError::Invalid(
                "feed.api_key and feed.api_secret are required for the live feed".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.worker.buffer_size, 1000);
        assert_eq!(config.enrichment.min_history_periods, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_buffer_rejected() {
        let mut config = AppConfig::default();
        config.worker.buffer_size = 50;
        assert!(config.validate().is_err());

        config.worker.buffer_size = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_live_feed_requires_credentials() {
        let mut config = AppConfig::default();
        config.feed.use_mock = false;
        assert!(config.validate().is_err());

        config.feed.api_key = "key".to_string();
        config.feed.api_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_speed_multiplier_must_be_positive() {
        let mut config = AppConfig::default();
        config.feed.speed_multiplier = 0.0;
        assert!(config.validate().is_err());
        config.feed.speed_multiplier = -2.0;
        assert!(config.validate().is_err());
    }
}
