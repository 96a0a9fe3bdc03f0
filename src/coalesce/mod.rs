//! Read-path deduplication: short-lived caching plus coalescing of in-flight fetches.

mod cache;
mod coalescer;

pub use cache::{CacheEntry, ResourceKey};
pub use coalescer::{CoalescerStats, RequestCoalescer};
