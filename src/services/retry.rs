//! 重试策略
//!
//! 重试状态是显式数据（`AttemptState`），策略只做计算，不做等待

use rand::Rng;
use std::time::Duration;

use crate::config::Config;
use crate::models::Relaxation;

/// 完整要求下的尝试次数，之后开始逐步放宽
const FULL_SPEC_ATTEMPTS: u32 = 3;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待时间（不含抖动）
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// 带随机抖动的等待时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_backoff(attempt) + Duration::from_millis(jitter)
    }

    /// 第 `attempt` 次尝试使用的放宽程度
    pub fn relaxation(&self, attempt: u32) -> Relaxation {
        match attempt {
            0..=FULL_SPEC_ATTEMPTS => Relaxation::Full,
            4 => Relaxation::WithoutTopic,
            _ => Relaxation::WithoutTopicAndInstructions,
        }
    }
}

/// 最近一次失败的类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastFailure {
    /// 临时性调用失败
    Transient(String),
    /// 质检未通过
    Rejected(Vec<String>),
}

/// 单个槽位的尝试状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// 已开始的尝试次数
    pub attempts: u32,
    pub last_failure: Option<LastFailure>,
}

impl AttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新的一次尝试，返回尝试序号（从 1 开始）
    pub fn begin(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn record_transient(&mut self, message: impl Into<String>) {
        self.last_failure = Some(LastFailure::Transient(message.into()));
    }

    pub fn record_rejection(&mut self, reasons: Vec<String>) {
        self.last_failure = Some(LastFailure::Rejected(reasons));
    }

    /// 是否还有剩余尝试次数
    pub fn has_remaining(&self, policy: &RetryPolicy) -> bool {
        self.attempts < policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_backoff(1), Duration::from_millis(500));
        assert_eq!(policy.base_backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.base_backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.base_backoff(4), Duration::from_millis(4000));
        assert_eq!(policy.base_backoff(10), Duration::from_millis(4000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.backoff(2);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_relaxation_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.relaxation(1), Relaxation::Full);
        assert_eq!(policy.relaxation(3), Relaxation::Full);
        assert_eq!(policy.relaxation(4), Relaxation::WithoutTopic);
        assert_eq!(
            policy.relaxation(5),
            Relaxation::WithoutTopicAndInstructions
        );
    }

    #[test]
    fn test_attempts_remaining() {
        let policy = RetryPolicy::default();
        let mut state = AttemptState::new();
        for expected in 1..=5 {
            assert_eq!(state.begin(), expected);
        }
        assert!(!state.has_remaining(&policy));
    }
}
