//! 单飞缓存 - 基础设施层
//!
//! 指纹 → 结果单元的映射：
//! - 同一指纹同一时刻最多只有一个领头调用（`FlightLeader`）
//! - 后到的调用者挂在领头调用的结果上（`FlightWaiter`），不会重复发起调用
//! - 成功结果在 TTL 内复用，失败结果只分享给当时的等待者

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

type Outcome<T, E> = Option<Result<T, E>>;

enum Entry<T, E> {
    Ready { value: T, expires_at: Instant },
    InFlight {
        flight_id: u64,
        rx: watch::Receiver<Outcome<T, E>>,
    },
}

struct CacheInner<T, E> {
    entries: Mutex<HashMap<String, Entry<T, E>>>,
    ttl: Duration,
    next_flight: AtomicU64,
}

impl<T, E> CacheInner<T, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<T, E>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 查询结果
pub enum Lookup<T, E> {
    /// 缓存命中
    Hit(T),
    /// 已有调用在进行中，等待其结果
    Wait(FlightWaiter<T, E>),
    /// 由当前调用者负责发起调用
    Lead(FlightLeader<T, E>),
}

/// 单飞缓存
pub struct FlightCache<T, E> {
    inner: Arc<CacheInner<T, E>>,
}

impl<T, E> Clone for FlightCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> FlightCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                ttl,
                next_flight: AtomicU64::new(1),
            }),
        }
    }

    /// 查询指纹：命中 / 等待 / 领头
    pub fn lookup(&self, key: &str) -> Lookup<T, E> {
        let mut entries = self.inner.lock();

        match entries.get(key) {
            Some(Entry::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                return Lookup::Hit(value.clone());
            }
            Some(Entry::InFlight { rx, .. }) => {
                return Lookup::Wait(FlightWaiter { rx: rx.clone() });
            }
            _ => {}
        }

        let flight_id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        entries.insert(key.to_string(), Entry::InFlight { flight_id, rx });
        debug!("单飞缓存: 指纹 {} 由新的调用领头 (flight #{})", short(key), flight_id);

        Lookup::Lead(FlightLeader {
            cache: self.inner.clone(),
            key: key.to_string(),
            flight_id,
            tx: Some(tx),
        })
    }

    /// 移除指纹对应的缓存结果（质检不通过时调用）
    ///
    /// 进行中的调用不受影响
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.inner.lock();
        if matches!(entries.get(key), Some(Entry::Ready { .. })) {
            entries.remove(key);
            debug!("单飞缓存: 指纹 {} 已失效", short(key));
        }
    }

    /// 当前有效的缓存条目数
    pub fn ready_len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .values()
            .filter(|e| matches!(e, Entry::Ready { expires_at, .. } if *expires_at > now))
            .count()
    }
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

/// 等待者
pub struct FlightWaiter<T, E> {
    rx: watch::Receiver<Outcome<T, E>>,
}

impl<T: Clone, E: Clone> FlightWaiter<T, E> {
    /// 等待领头调用的结果
    ///
    /// 返回 `None` 表示领头调用被放弃，调用者应重新查询
    pub async fn wait(mut self) -> Option<Result<T, E>> {
        match self.rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        }
    }
}

/// 领头者
///
/// 未调用 `complete` 就被丢弃时移除在途条目，等待者会收到 `None`
pub struct FlightLeader<T, E> {
    cache: Arc<CacheInner<T, E>>,
    key: String,
    flight_id: u64,
    tx: Option<watch::Sender<Outcome<T, E>>>,
}

impl<T: Clone, E: Clone> FlightLeader<T, E> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 发布结果：成功结果写入缓存，失败结果只通知当前等待者
    pub fn complete(mut self, result: Result<T, E>) {
        {
            let mut entries = self.cache.lock();
            let owns_entry = matches!(
                entries.get(&self.key),
                Some(Entry::InFlight { flight_id, .. }) if *flight_id == self.flight_id
            );
            if owns_entry {
                match &result {
                    Ok(value) => {
                        entries.insert(
                            self.key.clone(),
                            Entry::Ready {
                                value: value.clone(),
                                expires_at: Instant::now() + self.cache.ttl,
                            },
                        );
                    }
                    Err(_) => {
                        entries.remove(&self.key);
                    }
                }
            }
        }

        if let Some(tx) = self.tx.take() {
            // 没有等待者时发送失败，忽略即可
            let _ = tx.send(Some(result));
        }
    }
}

impl<T, E> Drop for FlightLeader<T, E> {
    fn drop(&mut self) {
        if self.tx.is_none() {
            return;
        }
        let mut entries = self.cache.lock();
        let owns_entry = matches!(
            entries.get(&self.key),
            Some(Entry::InFlight { flight_id, .. }) if *flight_id == self.flight_id
        );
        if owns_entry {
            entries.remove(&self.key);
        }
    }
}
