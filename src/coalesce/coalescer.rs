use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::cache::CacheEntry;
use crate::error::SyncError;

type Waiter<V> = oneshot::Sender<Result<V, SyncError>>;

/// Counters describing how reads were served.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Served from a fresh cache entry.
    pub hits: u64,
    /// Issued an underlying fetch.
    pub misses: u64,
    /// Joined a fetch already in flight.
    pub coalesced: u64,
    /// Underlying fetches that failed.
    pub failures: u64,
}

struct Flight<V> {
    id: u64,
    waiters: Vec<Waiter<V>>,
    // Cleared when the key is invalidated mid-flight; the result is still
    // delivered to waiters but not cached.
    cacheable: bool,
}

struct Inner<K, V> {
    cache: HashMap<K, CacheEntry<K, V>>,
    in_flight: HashMap<K, Flight<V>>,
    next_flight: u64,
    stats: CoalescerStats,
}

enum Role<V> {
    Hit(V),
    Join(oneshot::Receiver<Result<V, SyncError>>),
    Lead(u64),
}

/// Deduplicates concurrent reads and serves short-lived cached results.
///
/// Expiry is lazy: a stale entry is only noticed by the next `fetch` for its
/// key. Failures are never cached.
pub struct RequestCoalescer<K, V> {
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> RequestCoalescer<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        RequestCoalescer {
            ttl,
            inner: Mutex::new(Inner {
                cache: HashMap::new(),
                in_flight: HashMap::new(),
                next_flight: 1,
                stats: CoalescerStats::default(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<K, V>>, SyncError> {
        self.inner
            .lock()
            .map_err(|_| SyncError::LockPoisoned("coalescer"))
    }

    /// Fetch `key`, calling `load` only if there is neither a fresh cache entry
    /// nor a fetch for the same key already in flight.
    pub async fn fetch<F, Fut>(&self, key: K, load: F) -> Result<V, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SyncError>>,
    {
        let role = self.claim(&key)?;
        match role {
            Role::Hit(payload) => Ok(payload),
            Role::Join(rx) => rx.await.unwrap_or_else(|_| {
                Err(SyncError::FetchFailed {
                    resource: key.to_string(),
                    message: "in-flight fetch was abandoned".into(),
                })
            }),
            Role::Lead(id) => {
                let mut flight = FlightGuard {
                    coalescer: self,
                    key: &key,
                    id,
                    settled: false,
                };
                let result = load().await;
                flight.settle(&result)?;
                result
            }
        }
    }

    fn claim(&self, key: &K) -> Result<Role<V>, SyncError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let now = Instant::now();

        if let Some(entry) = inner.cache.get(key) {
            if entry.is_fresh(now, self.ttl) {
                inner.stats.hits += 1;
                debug!(resource = %key, "cache hit");
                return Ok(Role::Hit(entry.payload.clone()));
            }
            inner.cache.remove(key);
        }

        if let Some(flight) = inner.in_flight.get_mut(key) {
            let (tx, rx) = oneshot::channel();
            flight.waiters.push(tx);
            inner.stats.coalesced += 1;
            debug!(resource = %key, "joined in-flight fetch");
            return Ok(Role::Join(rx));
        }

        let id = inner.next_flight;
        inner.next_flight += 1;
        inner.in_flight.insert(
            key.clone(),
            Flight {
                id,
                waiters: Vec::new(),
                cacheable: true,
            },
        );
        inner.stats.misses += 1;
        debug!(resource = %key, flight = id, "cache miss, fetching");
        Ok(Role::Lead(id))
    }

    /// Drop the cached entry for `key`. A fetch in flight for it still
    /// completes, but its result is not cached.
    pub fn invalidate(&self, key: &K) -> Result<(), SyncError> {
        let mut inner = self.lock()?;
        inner.cache.remove(key);
        if let Some(flight) = inner.in_flight.get_mut(key) {
            flight.cacheable = false;
        }
        Ok(())
    }

    pub fn invalidate_all(&self) -> Result<(), SyncError> {
        let mut inner = self.lock()?;
        inner.cache.clear();
        for flight in inner.in_flight.values_mut() {
            flight.cacheable = false;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<CoalescerStats, SyncError> {
        Ok(self.lock()?.stats)
    }

    /// Number of keys with a fetch currently in flight.
    pub fn in_flight(&self) -> Result<usize, SyncError> {
        Ok(self.lock()?.in_flight.len())
    }
}

/// Clears the in-flight marker for a led fetch, including when the leading
/// future is dropped before it settles.
struct FlightGuard<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    coalescer: &'a RequestCoalescer<K, V>,
    key: &'a K,
    id: u64,
    settled: bool,
}

impl<K, V> FlightGuard<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    fn settle(&mut self, result: &Result<V, SyncError>) -> Result<(), SyncError> {
        self.settled = true;
        let mut inner = self.coalescer.lock()?;
        let owned = inner.in_flight.get(self.key).map(|f| f.id) == Some(self.id);
        let Some(flight) = owned.then(|| inner.in_flight.remove(self.key)).flatten() else {
            return Ok(());
        };

        match result {
            Ok(payload) => {
                if flight.cacheable && !self.coalescer.ttl.is_zero() {
                    inner.cache.insert(
                        self.key.clone(),
                        CacheEntry::new(self.key.clone(), payload.clone(), Instant::now()),
                    );
                }
            }
            Err(err) => {
                inner.stats.failures += 1;
                warn!(
                    resource = %self.key,
                    error = %err,
                    waiters = flight.waiters.len(),
                    "fetch failed"
                );
            }
        }
        drop(inner);

        for waiter in flight.waiters {
            let _ = waiter.send(result.clone());
        }
        Ok(())
    }
}

impl<K, V> Drop for FlightGuard<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Dropping the flight drops its senders, which wakes every waiter
        // with an abandoned-fetch error.
        if let Ok(mut inner) = self.coalescer.inner.lock() {
            if inner.in_flight.get(self.key).map(|f| f.id) == Some(self.id) {
                inner.in_flight.remove(self.key);
            }
        }
    }
}
