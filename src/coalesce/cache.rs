use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::forecast::ScenarioId;

/// Typed identity of a cacheable read: a resource within a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub resource: String,
    pub scenario: ScenarioId,
}

impl ResourceKey {
    pub fn new(resource: impl Into<String>, scenario: ScenarioId) -> Self {
        ResourceKey {
            resource: resource.into(),
            scenario,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource, self.scenario)
    }
}

/// A settled fetch result and the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub payload: V,
    pub fetched_at: Instant,
}

impl<K, V> CacheEntry<K, V> {
    pub fn new(key: K, payload: V, fetched_at: Instant) -> Self {
        CacheEntry {
            key,
            payload,
            fetched_at,
        }
    }

    /// Valid while `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}
