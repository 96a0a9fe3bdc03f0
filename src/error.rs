use thiserror::Error;

use crate::forecast::ScenarioId;

/// Errors surfaced by the synchronization engine.
///
/// The type is `Clone` so that a single failed fetch can be handed to every
/// caller that was coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A read through the coalescer failed. Never cached.
    #[error("fetch failed for {resource}: {message}")]
    FetchFailed { resource: String, message: String },

    /// A batched write failed; local state was rolled back.
    #[error("persist failed for scenario {scenario} (batch {batch}): {message}")]
    PersistFailed {
        scenario: ScenarioId,
        batch: u64,
        message: String,
    },

    /// A proposed mutation was rejected before reaching the store.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    /// Pending edits were dropped by a scenario switch before they were written.
    #[error("pending edits for scenario {scenario} were discarded by a scenario switch")]
    Discarded { scenario: ScenarioId },

    #[error("sync engine lock poisoned during {0}")]
    LockPoisoned(&'static str),

    /// The flush driver is no longer running.
    #[error("sync engine stopped")]
    Stopped,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SyncError::InvalidMutation(message.into())
    }

    /// Whether a later caller action may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::FetchFailed { .. } | SyncError::PersistFailed { .. }
        )
    }
}

/// Transport-level failure reported by a [`ForecastBackend`](crate::ForecastBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}
