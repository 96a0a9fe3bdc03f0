//! Flush driver: the spawned task that owns the single-flight write loop.
//!
//! The loop asks the [`BatchScheduler`] what to do, sleeps until the
//! quiescence deadline or the next wake-up, and hands sealed batches to the
//! backend one at a time. Engine state is only ever touched under the state
//! lock, and the lock is never held across the backend call.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::notice::{Notifier, SyncNotice};
use crate::backend::{BulkWrite, ForecastBackend};
use crate::batch::{BatchScheduler, SchedulerAction};
use crate::coalesce::{RequestCoalescer, ResourceKey};
use crate::config::SyncConfig;
use crate::error::{BackendError, SyncError};
use crate::forecast::{ForecastLine, MutationRequest, Operation, ScenarioId};
use crate::store::OptimisticMutator;

pub(super) type LineCache = RequestCoalescer<ResourceKey, Arc<Vec<ForecastLine>>>;

/// A caller of `force_flush_now` waiting for batch `target` to settle.
pub(super) struct FlushWaiter {
    pub target: u64,
    pub tx: oneshot::Sender<Result<(), SyncError>>,
}

pub(super) struct EngineState {
    pub scenario: ScenarioId,
    /// Bumped on every scenario switch; outcomes of older flights are ignored.
    pub epoch: u64,
    /// Bumped whenever the store or its persisted counterpart changes, so a
    /// load that raced an edit or a settled batch is not applied.
    pub revision: u64,
    pub mutator: OptimisticMutator,
    pub scheduler: BatchScheduler,
    pub waiters: Vec<FlushWaiter>,
    pub closed: bool,
}

impl EngineState {
    pub fn new(scenario: ScenarioId, config: &SyncConfig) -> Self {
        EngineState {
            scenario,
            epoch: 0,
            revision: 0,
            mutator: OptimisticMutator::default(),
            scheduler: BatchScheduler::new(config.quiescence),
            waiters: Vec::new(),
            closed: false,
        }
    }

    /// Resolve every waiter whose batch is `seq` or older.
    fn release(&mut self, seq: u64) {
        let (done, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.waiters)
            .into_iter()
            .partition(|w| w.target <= seq);
        self.waiters = waiting;
        for waiter in done {
            let _ = waiter.tx.send(Ok(()));
        }
    }

    pub fn fail_waiters(&mut self, err: &SyncError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.tx.send(Err(err.clone()));
        }
    }
}

pub(super) struct Shared {
    pub config: SyncConfig,
    pub backend: Arc<dyn ForecastBackend>,
    pub coalescer: LineCache,
    pub notifier: Notifier,
    pub state: Mutex<EngineState>,
    pub wake: Notify,
}

impl Shared {
    pub fn state(&self) -> Result<MutexGuard<'_, EngineState>, SyncError> {
        self.state
            .lock()
            .map_err(|_| SyncError::LockPoisoned("engine state"))
    }

    pub fn cache_key(&self, scenario: &ScenarioId) -> ResourceKey {
        ResourceKey::new(self.config.resource.clone(), scenario.clone())
    }
}

/// A sealed batch on its way to the backend.
struct Flight {
    seq: u64,
    epoch: u64,
    mutations: Vec<MutationRequest>,
    request: BulkWrite,
}

enum Step {
    Stop,
    Wait(Option<Instant>),
    Flush(Flight),
}

pub(super) async fn run(shared: Arc<Shared>) {
    loop {
        let step = match next_step(&shared) {
            Ok(step) => step,
            Err(err) => {
                warn!(error = %err, "flush driver cannot read engine state");
                break;
            }
        };

        match step {
            Step::Stop => break,
            Step::Wait(Some(deadline)) => {
                tokio::select! {
                    _ = time::sleep_until(deadline) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            Step::Wait(None) => shared.wake.notified().await,
            Step::Flush(flight) => {
                let result = write(&shared, &flight).await;
                settle(&shared, flight, result);
            }
        }
    }

    let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
    state.closed = true;
    state.fail_waiters(&SyncError::Stopped);
    debug!("flush driver stopped");
}

fn next_step(shared: &Shared) -> Result<Step, SyncError> {
    let mut state = shared.state()?;
    if state.closed {
        return Ok(Step::Stop);
    }

    match state.scheduler.next_action(Instant::now()) {
        SchedulerAction::Wait(deadline) => Ok(Step::Wait(deadline)),
        SchedulerAction::Flush(batch) => {
            state.mutator.seal();
            let forecasts = state.mutator.resolve(&batch.mutations);
            debug!(
                batch = batch.seq,
                scenario = %state.scenario,
                mutations = batch.len(),
                lines = forecasts.len(),
                "flushing batch"
            );
            Ok(Step::Flush(Flight {
                seq: batch.seq,
                epoch: state.epoch,
                mutations: batch.mutations,
                request: BulkWrite {
                    resource: shared.config.resource.clone(),
                    scenario_id: state.scenario.clone(),
                    operation: Operation::Replace,
                    forecasts,
                },
            }))
        }
    }
}

async fn write(shared: &Shared, flight: &Flight) -> Result<(), BackendError> {
    // Only subtracts against missing lines; nothing to persist.
    if flight.request.forecasts.is_empty() {
        return Ok(());
    }
    shared.backend.bulk_write(flight.request.clone()).await
}

fn settle(shared: &Shared, flight: Flight, result: Result<(), BackendError>) {
    let notice = {
        let mut state = match shared.state() {
            Ok(state) => state,
            Err(err) => {
                warn!(batch = flight.seq, error = %err, "cannot settle batch");
                return;
            }
        };

        let current = flight.epoch == state.epoch;
        // A stale failure must not drop edits already pending for the new scenario.
        state.scheduler.flush_settled(result.is_ok() || !current);
        if !current {
            // Callers that waited out the stale flight have nothing left to wait for.
            state.release(flight.seq);
            debug!(
                batch = flight.seq,
                scenario = %flight.request.scenario_id,
                ok = result.is_ok(),
                "ignoring outcome of batch from a previous scenario"
            );
            return;
        }

        let scenario = state.scenario.clone();
        state.revision += 1;
        match result {
            Ok(()) => {
                state.mutator.confirm(&flight.mutations);
                state.release(flight.seq);
                if let Err(err) = shared.coalescer.invalidate(&shared.cache_key(&scenario)) {
                    warn!(error = %err, "could not invalidate cached lines");
                }
                info!(
                    batch = flight.seq,
                    scenario = %scenario,
                    lines = flight.request.forecasts.len(),
                    "batch persisted"
                );
                SyncNotice::PersistConfirmed {
                    scenario,
                    batch: flight.seq,
                    lines: flight.request.forecasts.len(),
                }
            }
            Err(err) => {
                let rolled_back = state.mutator.rollback();
                let message = err.to_string();
                state.fail_waiters(&SyncError::PersistFailed {
                    scenario: scenario.clone(),
                    batch: flight.seq,
                    message: message.clone(),
                });
                warn!(
                    batch = flight.seq,
                    scenario = %scenario,
                    error = %err,
                    rolled_back,
                    "batch write failed"
                );
                SyncNotice::PersistFailed {
                    scenario,
                    batch: flight.seq,
                    message,
                    rolled_back,
                }
            }
        }
    };
    shared.notifier.emit(&notice);
}
