use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod metrics;
pub mod time;

/// # Summary
/// 交易时间周期枚举，定义 K 线的时间跨度。
///
/// # Invariants
/// - 周期集合封闭：仅允许这七个档位。
/// - 所有桶对齐计算必须以 `duration_secs` 为栅格做 UTC 地板整除。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeFrame {
    // 1分钟
    Minute1,
    // 5分钟
    Minute5,
    // 15分钟
    Minute15,
    // 30分钟
    Minute30,
    // 1小时
    Hour1,
    // 4小时
    Hour4,
    // 1日
    Day1,
}

impl TimeFrame {
    /// # Summary
    /// 返回全部受支持的周期，按跨度升序排列。
    ///
    /// # Returns
    /// 静态周期切片。
    pub fn all() -> &'static [TimeFrame] {
        &[
            TimeFrame::Minute1,
            TimeFrame::Minute5,
            TimeFrame::Minute15,
            TimeFrame::Minute30,
            TimeFrame::Hour1,
            TimeFrame::Hour4,
            TimeFrame::Day1,
        ]
    }

    /// # Summary
    /// 获取该周期的秒数跨度。
    ///
    /// # Returns
    /// 周期长度（秒）。
    pub fn duration_secs(&self) -> i64 {
        match self {
            TimeFrame::Minute1 => 60,
            TimeFrame::Minute5 => 5 * 60,
            TimeFrame::Minute15 => 15 * 60,
            TimeFrame::Minute30 => 30 * 60,
            TimeFrame::Hour1 => 3600,
            TimeFrame::Hour4 => 4 * 3600,
            TimeFrame::Day1 => 86_400,
        }
    }

    /// # Summary
    /// 将任意时间戳向下对齐到本周期的栅格起点 (UTC 整除)。
    ///
    /// # Logic
    /// 1. 取 Unix 秒级时间戳。
    /// 2. 对周期秒数做地板整除后还原为 DateTime。
    ///
    /// # Arguments
    /// * `ts`: 待对齐的时间点。
    ///
    /// # Returns
    /// 对齐后的桶起始时间。
    pub fn bucket_start(&self, ts: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        let step = self.duration_secs();
        let secs = ts.timestamp().div_euclid(step) * step;
        chrono::DateTime::from_timestamp(secs, 0).unwrap_or(ts)
    }

    /// # Summary
    /// 获取该周期在对外协议中使用的长名 (wire form)。
    ///
    /// # Returns
    /// 如 "1min", "4hour", "1day"。
    pub fn wire_name(&self) -> &'static str {
        match self {
            TimeFrame::Minute1 => "1min",
            TimeFrame::Minute5 => "5min",
            TimeFrame::Minute15 => "15min",
            TimeFrame::Minute30 => "30min",
            TimeFrame::Hour1 => "1hour",
            TimeFrame::Hour4 => "4hour",
            TimeFrame::Day1 => "1day",
        }
    }
}

impl FromStr for TimeFrame {
    type Err = String;

    /// # Summary
    /// 解析周期字符串，同时接受内部短形式与协议长形式。
    ///
    /// # Arguments
    /// * `s`: 周期字符串，如 "1m" 或 "1min"。
    ///
    /// # Returns
    /// 成功返回对应枚举，未知字符串返回错误描述。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" | "minute1" => Ok(TimeFrame::Minute1),
            "5m" | "5min" | "minute5" => Ok(TimeFrame::Minute5),
            "15m" | "15min" | "minute15" => Ok(TimeFrame::Minute15),
            "30m" | "30min" | "minute30" => Ok(TimeFrame::Minute30),
            "1h" | "1hour" | "hour1" => Ok(TimeFrame::Hour1),
            "4h" | "4hour" | "hour4" => Ok(TimeFrame::Hour4),
            "1d" | "1day" | "day1" => Ok(TimeFrame::Day1),
            _ => Err(format!("Unknown TimeFrame: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeFrame::Minute1 => write!(f, "1m"),
            TimeFrame::Minute5 => write!(f, "5m"),
            TimeFrame::Minute15 => write!(f, "15m"),
            TimeFrame::Minute30 => write!(f, "30m"),
            TimeFrame::Hour1 => write!(f, "1h"),
            TimeFrame::Hour4 => write!(f, "4h"),
            TimeFrame::Day1 => write!(f, "1d"),
        }
    }
}

/// # Summary
/// 校验证券代码是否合法 (1 至 5 个大写英文字母)。
///
/// # Logic
/// 1. 检查长度落在 [1, 5]。
/// 2. 检查每个字符均为 ASCII 大写字母。
///
/// # Arguments
/// * `symbol`: 待校验的证券代码。
///
/// # Returns
/// 合法返回 Ok，否则返回携带原因的错误描述。
pub fn validate_symbol(symbol: &str) -> Result<(), String> {
    if symbol.is_empty() || symbol.len() > 5 {
        return Err(format!(
            "symbol must be 1-5 characters, got {}",
            symbol.len()
        ));
    }
    if !symbol.chars().all(|c| c.is_ascii_uppercase()) {
        return Err("symbol must contain only uppercase letters".to_string());
    }
    Ok(())
}

/// # Summary
/// 将 (symbol, timeframe) 组合编码为订阅键。
///
/// # Arguments
/// * `symbol`: 证券代码。
/// * `timeframe`: K 线周期。
///
/// # Returns
/// 形如 "AAPL:1m" 的键字符串。
pub fn subscription_key(symbol: &str, timeframe: TimeFrame) -> String {
    format!("{}:{}", symbol, timeframe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timeframe_roundtrip() {
        for tf in TimeFrame::all() {
            // 短形式与协议长形式都必须能解析回自身
            assert_eq!(tf.to_string().parse::<TimeFrame>(), Ok(*tf));
            assert_eq!(tf.wire_name().parse::<TimeFrame>(), Ok(*tf));
        }
        assert!("2h".parse::<TimeFrame>().is_err());
    }

    #[test]
    fn test_bucket_alignment() {
        let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 34, 56).unwrap();

        let m1 = TimeFrame::Minute1.bucket_start(ts);
        assert_eq!(
            m1,
            chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 34, 0).unwrap()
        );

        let m5 = TimeFrame::Minute5.bucket_start(ts);
        assert_eq!(
            m5,
            chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).unwrap()
        );

        let h4 = TimeFrame::Hour4.bucket_start(ts);
        assert_eq!(
            h4,
            chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
        );

        let d1 = TimeFrame::Day1.bucket_start(ts);
        assert_eq!(
            d1,
            chrono::Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_boundary_timestamp_belongs_to_new_bucket() {
        // 恰好落在栅格边界的时间点必须归属新桶
        let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 2, 12, 35, 0).unwrap();
        assert_eq!(TimeFrame::Minute5.bucket_start(ts), ts);
    }

    #[test]
    fn test_symbol_validation() {
        assert!(validate_symbol("AAPL").is_ok());
        assert!(validate_symbol("A").is_ok());
        assert!(validate_symbol("GOOGL").is_ok());
        assert!(validate_symbol("aapl").is_err());
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("TOOLONG").is_err());
        assert!(validate_symbol("AB1").is_err());
    }
}
