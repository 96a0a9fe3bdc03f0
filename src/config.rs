use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Tuning constants for a [`SyncEngine`](crate::SyncEngine).
///
/// Deserializes from JSON such as
/// `{"resource": "forecasts", "quiescence_ms": 400, "cache_ttl_ms": 5000}`;
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upstream resource name used for list and bulk-write calls.
    pub resource: String,
    /// Debounce window during which edits accumulate into one batch.
    #[serde(rename = "quiescence_ms", with = "millis")]
    pub quiescence: Duration,
    /// How long a fetched payload is served from cache. Zero disables caching.
    #[serde(rename = "cache_ttl_ms", with = "millis")]
    pub cache_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            resource: "forecasts".to_string(),
            quiescence: Duration::from_millis(400),
            cache_ttl: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the upstream resource name.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Set the quiescence (debounce) window.
    pub fn with_quiescence(mut self, window: Duration) -> Self {
        self.quiescence = window;
        self
    }

    /// Set the read cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.resource.trim().is_empty() {
            return Err(SyncError::Config("resource must not be empty".into()));
        }
        if self.quiescence.is_zero() {
            return Err(SyncError::Config("quiescence window must be non-zero".into()));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom(format!("{value:?} does not fit in u64 milliseconds")))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
