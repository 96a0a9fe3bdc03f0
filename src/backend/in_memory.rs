use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;

use super::{BulkWrite, ForecastBackend};
use crate::coalesce::ResourceKey;
use crate::error::BackendError;
use crate::forecast::{ForecastLine, MutationRequest, Operation, ScenarioId};
use crate::store::KeyedRecordStore;

/// Call counters for an [`InMemoryBackend`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendStats {
    pub lists: usize,
    pub bulk_writes: usize,
    pub failed_writes: usize,
    pub lines_written: usize,
}

#[derive(Default)]
struct BackendState {
    tables: HashMap<ResourceKey, KeyedRecordStore>,
    fail_reads: usize,
    fail_writes: usize,
    stats: BackendStats,
}

/// In-memory persistence service backed by `Arc<RwLock<...>>`.
///
/// Clone-friendly (cloning shares the same underlying storage), which lets a
/// test keep a handle to inspect what the engine wrote. Failures can be
/// injected for the next N reads or writes.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<BackendState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BackendState>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::Transport("backend lock poisoned".into()))
    }

    /// Preload lines. Each line lands in the table of its own scenario.
    pub fn seed(&self, resource: &str, lines: impl IntoIterator<Item = ForecastLine>) {
        if let Ok(mut state) = self.write() {
            for line in lines {
                let key = ResourceKey::new(resource, line.key().scenario_id().clone());
                let table = state.tables.entry(key).or_default();
                *table = table.apply_batch(&[as_mutation(&line, Operation::Replace)]);
            }
        }
    }

    /// Lines currently persisted for `resource` in `scenario`.
    pub fn lines(&self, resource: &str, scenario: &ScenarioId) -> Vec<ForecastLine> {
        let key = ResourceKey::new(resource, scenario.clone());
        self.state
            .read()
            .ok()
            .and_then(|state| state.tables.get(&key).map(|t| t.list().to_vec()))
            .unwrap_or_default()
    }

    pub fn fail_next_reads(&self, count: usize) {
        if let Ok(mut state) = self.write() {
            state.fail_reads = count;
        }
    }

    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut state) = self.write() {
            state.fail_writes = count;
        }
    }

    pub fn stats(&self) -> BackendStats {
        self.state
            .read()
            .map(|state| state.stats)
            .unwrap_or_default()
    }
}

fn as_mutation(line: &ForecastLine, operation: Operation) -> MutationRequest {
    MutationRequest {
        key: line.key().clone(),
        quantity: line.quantity(),
        unit_price: Some(line.unit_price()),
        operation,
    }
}

#[async_trait]
impl ForecastBackend for InMemoryBackend {
    async fn list(
        &self,
        resource: &str,
        scenario: &ScenarioId,
    ) -> Result<Vec<ForecastLine>, BackendError> {
        let mut state = self.write()?;
        state.stats.lists += 1;
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(BackendError::Transport("injected read failure".into()));
        }
        let key = ResourceKey::new(resource, scenario.clone());
        Ok(state
            .tables
            .get(&key)
            .map(|t| t.list().to_vec())
            .unwrap_or_default())
    }

    async fn bulk_write(&self, request: BulkWrite) -> Result<(), BackendError> {
        let mut state = self.write()?;
        state.stats.bulk_writes += 1;
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            state.stats.failed_writes += 1;
            return Err(BackendError::Transport("injected write failure".into()));
        }
        if let Some(line) = request
            .forecasts
            .iter()
            .find(|l| l.key().scenario_id() != &request.scenario_id)
        {
            return Err(BackendError::Rejected {
                status: 422,
                message: format!("{} is outside scenario {}", line.key(), request.scenario_id),
            });
        }

        let mutations: Vec<_> = request
            .forecasts
            .iter()
            .map(|line| as_mutation(line, request.operation))
            .collect();
        let key = ResourceKey::new(request.resource, request.scenario_id);
        let table = state.tables.entry(key).or_default();
        *table = table.apply_batch(&mutations);
        state.stats.lines_written += mutations.len();
        Ok(())
    }
}
