//! Optimistic, batched synchronization of keyed forecast lines.
//!
//! Edits made in a planning UI are applied to a local [`KeyedRecordStore`]
//! immediately, accumulated by a debounced single-flight [`BatchScheduler`],
//! and persisted as one bulk write. A [`SnapshotLedger`] keeps the last
//! confirmed state so a failed write can be rolled back. Reads go through a
//! [`RequestCoalescer`] that caches results briefly and collapses concurrent
//! fetches of the same resource. [`SyncEngine`] ties these together for one
//! active planning scenario at a time.

mod backend;
mod batch;
mod coalesce;
mod config;
mod engine;
mod error;
mod forecast;
mod snapshot;
mod store;

#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use backend::{BackendStats, BulkWrite, ForecastBackend, InMemoryBackend};
pub use batch::{BatchScheduler, PendingBatch, SchedulerAction, SchedulerPhase};
pub use coalesce::{CacheEntry, CoalescerStats, RequestCoalescer, ResourceKey};
pub use config::SyncConfig;
pub use engine::{Notifier, SyncEngine, SyncNotice};
pub use error::{BackendError, SyncError};
pub use forecast::{ForecastKey, ForecastLine, MutationRequest, Operation, ScenarioId};
pub use snapshot::SnapshotLedger;
pub use store::{KeyedRecordStore, OptimisticMutator};

// Re-export so callers can build quantities without naming the crate themselves
pub use rust_decimal::Decimal;
