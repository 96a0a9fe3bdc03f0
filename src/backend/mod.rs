//! Upstream persistence boundary: bulk list and atomic bulk write.

#[cfg(feature = "http")]
mod http;
mod in_memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::forecast::{ForecastLine, Operation, ScenarioId};

#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use in_memory::{BackendStats, InMemoryBackend};

/// One persistence call: every line is applied with `operation`, all or none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWrite {
    pub resource: String,
    pub scenario_id: ScenarioId,
    pub operation: Operation,
    pub forecasts: Vec<ForecastLine>,
}

/// Remote persistence service for forecast lines.
///
/// Used as `Arc<dyn ForecastBackend>`. Timeouts are the transport's concern
/// and should surface as an ordinary `Err`.
#[async_trait]
pub trait ForecastBackend: Send + Sync {
    /// Idempotent bulk read of every line of `resource` in `scenario`.
    async fn list(
        &self,
        resource: &str,
        scenario: &ScenarioId,
    ) -> Result<Vec<ForecastLine>, BackendError>;

    /// Atomically apply a batch of lines.
    async fn bulk_write(&self, request: BulkWrite) -> Result<(), BackendError>;
}
