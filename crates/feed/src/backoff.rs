use rand::Rng;
use std::time::Duration;

// 重连退避参数：基数 1s、倍率 2、上限 30s、抖动 ±20%
const BASE_MS: u64 = 1_000;
const FACTOR: u32 = 2;
const CAP_MS: u64 = 30_000;
const JITTER: f64 = 0.2;

/// # Summary
/// 指数退避状态机，供行情源重连与持久化重试复用。
///
/// # Invariants
/// - 裸延时单调不减，直到触达上限后保持封顶。
/// - 抖动只作用于单次取值，不影响后续序列。
#[derive(Debug)]
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    /// 从零次尝试开始构造
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// # Summary
    /// 取下一次等待时长并推进尝试计数。
    ///
    /// # Logic
    /// 1. 计算 `base · factor^attempt` 并截断到上限。
    /// 2. 叠加 ±20% 的均匀抖动。
    ///
    /// # Returns
    /// 本次应等待的时长。
    pub fn next_delay(&mut self) -> Duration {
        let raw = BASE_MS.saturating_mul(u64::from(FACTOR.saturating_pow(self.attempt)));
        let capped = raw.min(CAP_MS);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::rng().random_range(1.0 - JITTER..=1.0 + JITTER);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }

    /// 连接成功后清零尝试计数
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// 已经历的尝试次数
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_and_cap() {
        let mut backoff = Backoff::new();
        let low = |ms: u64| Duration::from_millis((ms as f64 * 0.8) as u64);
        let high = |ms: u64| Duration::from_millis((ms as f64 * 1.2) as u64);

        // 1s, 2s, 4s, 8s, 16s, 30s, 30s (每档含 ±20% 抖动)
        for expected in [1_000u64, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000] {
            let d = backoff.next_delay();
            assert!(d >= low(expected), "delay {:?} below {}ms band", d, expected);
            assert!(d <= high(expected), "delay {:?} above {}ms band", d, expected);
        }
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = Backoff::new();
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        let d = backoff.next_delay();
        assert!(d <= Duration::from_millis(1_200));
    }
}
