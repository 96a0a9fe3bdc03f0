//! Write-path batching: quiescence-window debounce with single-flight flushes.

mod pending;
mod scheduler;

pub use pending::PendingBatch;
pub use scheduler::{BatchScheduler, SchedulerAction, SchedulerPhase};
