//! 配额跟踪 - 基础设施层
//!
//! 持有进程级的配额状态，只暴露"预留 / 提交 / 查询"能力。
//! 所有修改都在同一把锁内完成，读取方拿到的是快照。

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const WINDOW_SECS: i64 = 60;

/// 配额上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub rate_limit_per_minute: u32,
    pub daily_quota: u32,
}

/// 配额快照（只读）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub requests_this_minute: u32,
    pub used_today: u32,
    /// 已预留但尚未提交的请求
    pub in_flight: u32,
    pub daily_quota: u32,
    pub rate_limit_per_minute: u32,
}

impl QuotaSnapshot {
    /// 当前窗口内还能发起的请求数
    pub fn remaining_this_minute(&self) -> u32 {
        self.rate_limit_per_minute
            .saturating_sub(self.requests_this_minute)
    }

    /// 当日剩余配额（扣除在途请求）
    pub fn remaining_today(&self) -> u32 {
        self.daily_quota
            .saturating_sub(self.used_today + self.in_flight)
    }
}

/// 预留被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDenial {
    RateLimited { retry_after_secs: u64 },
    QuotaExceeded { used: u32, quota: u32 },
}

#[derive(Debug)]
struct QuotaState {
    limits: QuotaLimits,
    requests_this_minute: u32,
    window_started: Option<DateTime<Utc>>,
    used_today: u32,
    in_flight: u32,
    day: NaiveDate,
}

impl QuotaState {
    fn new(limits: QuotaLimits, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            requests_this_minute: 0,
            window_started: None,
            used_today: 0,
            in_flight: 0,
            day: now.date_naive(),
        }
    }

    /// 滚动窗口与 UTC 零点重置
    fn roll(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.window_started {
            if now - started >= ChronoDuration::seconds(WINDOW_SECS) {
                self.requests_this_minute = 0;
                self.window_started = None;
            }
        }
        if now.date_naive() != self.day {
            self.day = now.date_naive();
            self.used_today = 0;
        }
    }

    fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            requests_this_minute: self.requests_this_minute,
            used_today: self.used_today,
            in_flight: self.in_flight,
            daily_quota: self.limits.daily_quota,
            rate_limit_per_minute: self.limits.rate_limit_per_minute,
        }
    }
}

#[derive(Debug)]
struct TrackerInner {
    default_limits: QuotaLimits,
    providers: HashMap<String, QuotaState>,
}

/// 配额跟踪器
///
/// 通过 `Arc` 共享，构造时注入，测试可为每个用例新建实例
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl QuotaTracker {
    pub fn new(default_limits: QuotaLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                default_limits,
                providers: HashMap::new(),
            })),
        }
    }

    /// 为指定服务设置单独的上限
    pub fn with_provider_limits(self, provider: &str, limits: QuotaLimits) -> Self {
        {
            let mut inner = self.lock();
            let now = Utc::now();
            inner
                .providers
                .entry(provider.to_string())
                .and_modify(|state| state.limits = limits)
                .or_insert_with(|| QuotaState::new(limits, now));
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // 锁内没有会 panic 的代码，中毒时直接取回数据
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 尝试预留一次调用
    pub fn try_reserve(&self, provider: &str) -> Result<QuotaReservation, QuotaDenial> {
        self.try_reserve_at(provider, Utc::now())
    }

    /// 尝试在指定时间点预留一次调用
    pub fn try_reserve_at(
        &self,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotaReservation, QuotaDenial> {
        let mut inner = self.lock();
        let limits = inner.default_limits;
        let state = inner
            .providers
            .entry(provider.to_string())
            .or_insert_with(|| QuotaState::new(limits, now));
        state.roll(now);

        if state.requests_this_minute >= state.limits.rate_limit_per_minute {
            let elapsed = state
                .window_started
                .map(|started| (now - started).num_seconds())
                .unwrap_or(0);
            let retry_after_secs = (WINDOW_SECS - elapsed).max(1) as u64;
            debug!(
                "配额预留被拒绝: {} 请求频率已达 {}/分钟",
                provider, state.limits.rate_limit_per_minute
            );
            return Err(QuotaDenial::RateLimited { retry_after_secs });
        }

        if state.used_today + state.in_flight >= state.limits.daily_quota {
            debug!(
                "配额预留被拒绝: {} 当日配额 {}/{} (在途 {})",
                provider, state.used_today, state.limits.daily_quota, state.in_flight
            );
            return Err(QuotaDenial::QuotaExceeded {
                used: state.used_today,
                quota: state.limits.daily_quota,
            });
        }

        if state.window_started.is_none() {
            state.window_started = Some(now);
        }
        // 每次实际发出的调用都计入频率窗口
        state.requests_this_minute += 1;
        state.in_flight += 1;

        Ok(QuotaReservation {
            tracker: self.clone(),
            provider: provider.to_string(),
            settled: false,
        })
    }

    /// 调用成功，计入当日用量
    pub fn commit(&self, mut reservation: QuotaReservation) {
        let mut inner = self.lock();
        if let Some(state) = inner.providers.get_mut(&reservation.provider) {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.used_today += 1;
        }
        reservation.settled = true;
    }

    fn release(&self, provider: &str) {
        let mut inner = self.lock();
        if let Some(state) = inner.providers.get_mut(provider) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    /// 当前用量快照
    pub fn current_usage(&self, provider: &str) -> QuotaSnapshot {
        self.current_usage_at(provider, Utc::now())
    }

    pub fn current_usage_at(&self, provider: &str, now: DateTime<Utc>) -> QuotaSnapshot {
        let mut inner = self.lock();
        let limits = inner.default_limits;
        let state = inner
            .providers
            .entry(provider.to_string())
            .or_insert_with(|| QuotaState::new(limits, now));
        state.roll(now);
        state.snapshot()
    }
}

/// 配额预留凭证
///
/// 未提交就被丢弃时自动释放在途名额（失败的调用不计入当日用量）
#[derive(Debug)]
pub struct QuotaReservation {
    tracker: QuotaTracker,
    provider: String,
    settled: bool,
}

impl QuotaReservation {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// 提交（等价于 `tracker.commit(reservation)`）
    pub fn commit(self) {
        let tracker = self.tracker.clone();
        tracker.commit(self);
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.release(&self.provider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limits(rate: u32, daily: u32) -> QuotaLimits {
        QuotaLimits {
            rate_limit_per_minute: rate,
            daily_quota: daily,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_eleventh_request_is_rate_limited() {
        let tracker = QuotaTracker::new(limits(10, 100));
        for i in 0..10 {
            let r = tracker.try_reserve_at("openai", at(9, 0, i)).unwrap();
            r.commit();
        }

        let denied = tracker.try_reserve_at("openai", at(9, 0, 30));
        assert!(matches!(
            denied,
            Err(QuotaDenial::RateLimited {
                retry_after_secs: 30
            })
        ));

        let snapshot = tracker.current_usage_at("openai", at(9, 0, 31));
        assert_eq!(snapshot.used_today, 10);
        assert_eq!(snapshot.requests_this_minute, 10);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[test]
    fn test_window_rolls_after_sixty_seconds() {
        let tracker = QuotaTracker::new(limits(2, 100));
        tracker.try_reserve_at("p", at(9, 0, 0)).unwrap().commit();
        tracker.try_reserve_at("p", at(9, 0, 10)).unwrap().commit();
        assert!(tracker.try_reserve_at("p", at(9, 0, 59)).is_err());
        assert!(tracker.try_reserve_at("p", at(9, 1, 0)).is_ok());
    }

    #[test]
    fn test_daily_quota_resets_at_utc_midnight() {
        let tracker = QuotaTracker::new(limits(100, 1));
        tracker.try_reserve_at("p", at(23, 59, 0)).unwrap().commit();
        assert!(matches!(
            tracker.try_reserve_at("p", at(23, 59, 30)),
            Err(QuotaDenial::QuotaExceeded { used: 1, quota: 1 })
        ));

        let next_day = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 1).unwrap();
        assert!(tracker.try_reserve_at("p", next_day).is_ok());
    }

    #[test]
    fn test_dropped_reservation_is_released() {
        let tracker = QuotaTracker::new(limits(100, 1));
        {
            let _r = tracker.try_reserve_at("p", at(9, 0, 0)).unwrap();
            assert!(tracker.try_reserve_at("p", at(9, 0, 1)).is_err());
        }
        let snapshot = tracker.current_usage_at("p", at(9, 0, 2));
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.used_today, 0);
        assert!(tracker.try_reserve_at("p", at(9, 0, 3)).is_ok());
    }

    #[test]
    fn test_remaining_counts_in_flight() {
        let tracker = QuotaTracker::new(limits(10, 5));
        tracker.try_reserve_at("p", at(9, 0, 0)).unwrap().commit();
        let _pending = tracker.try_reserve_at("p", at(9, 0, 1)).unwrap();

        let snapshot = tracker.current_usage_at("p", at(9, 0, 2));
        assert_eq!(snapshot.remaining_today(), 3);
        assert_eq!(snapshot.remaining_this_minute(), 8);
    }

    #[test]
    fn test_provider_specific_limits() {
        let tracker =
            QuotaTracker::new(limits(100, 100)).with_provider_limits("small", limits(1, 1));
        tracker.try_reserve_at("small", at(9, 0, 0)).unwrap().commit();
        assert!(tracker.try_reserve_at("small", at(9, 0, 1)).is_err());
        assert!(tracker.try_reserve_at("big", at(9, 0, 1)).is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_daily_quota() {
        let tracker = QuotaTracker::new(limits(1000, 5));
        let mut handles = Vec::new();
        for _ in 0..40 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                match tracker.try_reserve("p") {
                    Ok(reservation) => {
                        tokio::task::yield_now().await;
                        reservation.commit();
                        true
                    }
                    Err(_) => false,
                }
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        assert_eq!(tracker.current_usage("p").used_today, 5);
    }
}
