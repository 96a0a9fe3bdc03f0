use std::mem;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::driver::{self, EngineState, FlushWaiter, Shared};
use super::notice::{Notifier, SyncNotice};
use crate::backend::ForecastBackend;
use crate::batch::SchedulerPhase;
use crate::coalesce::{CoalescerStats, RequestCoalescer};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::forecast::{ForecastKey, ForecastLine, MutationRequest, ScenarioId};
use crate::store::KeyedRecordStore;

/// Optimistic, batched synchronization of forecast lines for one planning
/// scenario at a time.
///
/// Edits are applied to the local store immediately and persisted in the
/// background by a flush driver spawned on the current tokio runtime. Failed
/// writes are rolled back and reported as [`SyncNotice::PersistFailed`].
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use forecast_sync::{
///     Decimal, ForecastKey, InMemoryBackend, MutationRequest, SyncEngine, SyncError,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), SyncError> {
/// let engine = SyncEngine::new(Arc::new(InMemoryBackend::new()), "F001")?;
/// engine.load().await?;
///
/// let key = ForecastKey::new("P1", "C1", "2025-01", "F001")?;
/// engine.propose_edit(vec![MutationRequest::add(key, Decimal::new(10, 0))
///     .with_unit_price(Decimal::new(5, 0))])?;
///
/// // Visible before any network round trip.
/// assert_eq!(engine.visible_lines()?[0].derived_revenue(), Decimal::new(50, 0));
///
/// engine.force_flush_now().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine {
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Create an engine with the default [`SyncConfig`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        backend: Arc<dyn ForecastBackend>,
        scenario: impl Into<ScenarioId>,
    ) -> Result<Self, SyncError> {
        Self::with_config(backend, scenario, SyncConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn ForecastBackend>,
        scenario: impl Into<ScenarioId>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| SyncError::Config("SyncEngine requires a tokio runtime".into()))?;

        let shared = Arc::new(Shared {
            coalescer: RequestCoalescer::new(config.cache_ttl),
            state: Mutex::new(EngineState::new(scenario.into(), &config)),
            notifier: Notifier::new(),
            wake: Notify::new(),
            backend,
            config,
        });
        let driver = runtime.spawn(driver::run(Arc::clone(&shared)));

        Ok(SyncEngine {
            shared,
            driver: Some(driver),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub fn active_scenario(&self) -> Result<ScenarioId, SyncError> {
        Ok(self.shared.state()?.scenario.clone())
    }

    /// Every line in the optimistic store, in insertion order.
    pub fn visible_lines(&self) -> Result<Vec<ForecastLine>, SyncError> {
        Ok(self.shared.state()?.mutator.live().list().to_vec())
    }

    /// The optimistic store itself. The returned `Arc` is an immutable
    /// snapshot; later edits publish a new store.
    pub fn store(&self) -> Result<Arc<KeyedRecordStore>, SyncError> {
        Ok(Arc::clone(self.shared.state()?.mutator.live()))
    }

    pub fn get(&self, key: &ForecastKey) -> Result<Option<ForecastLine>, SyncError> {
        Ok(self.shared.state()?.mutator.live().get(key).cloned())
    }

    /// Whether edits have been applied locally that are not yet confirmed.
    pub fn has_unsaved_edits(&self) -> Result<bool, SyncError> {
        Ok(self.shared.state()?.mutator.has_outstanding())
    }

    pub fn phase(&self) -> Result<SchedulerPhase, SyncError> {
        Ok(self.shared.state()?.scheduler.phase())
    }

    /// Apply `mutations` to the visible store and queue them for persistence.
    ///
    /// Returns as soon as the store is updated. The batch is validated as a
    /// unit: a malformed mutation rejects all of them and nothing is applied.
    /// Persistence failures arrive later as notices.
    pub fn propose_edit(&self, mutations: Vec<MutationRequest>) -> Result<(), SyncError> {
        if mutations.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.shared.state()?;
            if state.closed {
                return Err(SyncError::Stopped);
            }
            for mutation in &mutations {
                mutation.validate_for(&state.scenario)?;
            }
            state.mutator.propose(&mutations);
            state.revision += 1;
            let seq = state.scheduler.enqueue(&mutations, Instant::now());
            debug!(batch = seq, mutations = mutations.len(), "edits proposed");
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Flush now and wait until every edit proposed before this call is
    /// durable. An in-flight batch is waited out first.
    pub async fn force_flush_now(&self) -> Result<(), SyncError> {
        let rx = {
            let mut state = self.shared.state()?;
            if state.closed {
                return Err(SyncError::Stopped);
            }
            let Some(target) = state.scheduler.force_flush() else {
                return Ok(());
            };
            let (tx, rx) = oneshot::channel();
            state.waiters.push(FlushWaiter { target, tx });
            debug!(batch = target, "force flush requested");
            rx
        };
        self.shared.wake.notify_one();
        rx.await.unwrap_or(Err(SyncError::Stopped))
    }

    /// Fetch the active scenario and replace the store with it.
    ///
    /// Returns `Ok(false)` when the lines were fetched but not applied: unsaved
    /// edits are outstanding, or an edit was proposed or a batch settled after
    /// the fetch started, or the scenario changed meanwhile.
    pub async fn load(&self) -> Result<bool, SyncError> {
        let (scenario, epoch, revision) = {
            let state = self.shared.state()?;
            (state.scenario.clone(), state.epoch, state.revision)
        };
        self.load_into(scenario, epoch, revision).await
    }

    /// Make `scenario` the active one.
    ///
    /// Everything belonging to the previous scenario is dropped: the store,
    /// the pending batch, the retained snapshot and the read cache. Callers
    /// waiting in [`force_flush_now`](Self::force_flush_now) get
    /// [`SyncError::Discarded`]. A write already in flight still completes,
    /// but its outcome no longer touches the store.
    pub async fn switch_scenario(
        &self,
        scenario: impl Into<ScenarioId>,
    ) -> Result<bool, SyncError> {
        let scenario = scenario.into();
        let (epoch, revision) = {
            let mut state = self.shared.state()?;
            if state.closed {
                return Err(SyncError::Stopped);
            }
            let previous = mem::replace(&mut state.scenario, scenario.clone());
            state.epoch += 1;
            state.revision += 1;
            state.mutator.replace_all(Vec::<ForecastLine>::new());
            state.scheduler.reset();
            state.fail_waiters(&SyncError::Discarded {
                scenario: previous.clone(),
            });
            info!(from = %previous, to = %scenario, "switching scenario");
            (state.epoch, state.revision)
        };
        self.shared.coalescer.invalidate_all()?;
        self.shared.wake.notify_one();
        self.load_into(scenario, epoch, revision).await
    }

    async fn load_into(
        &self,
        scenario: ScenarioId,
        epoch: u64,
        revision: u64,
    ) -> Result<bool, SyncError> {
        let lines = match self.fetch(&scenario).await {
            Ok(lines) => lines,
            Err(err) => {
                warn!(scenario = %scenario, error = %err, "load failed");
                self.shared.notifier.emit(&SyncNotice::LoadFailed {
                    scenario,
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        {
            let mut state = self.shared.state()?;
            if state.epoch != epoch {
                debug!(scenario = %scenario, "scenario changed during load, discarding lines");
                return Ok(false);
            }
            if state.mutator.has_outstanding() {
                debug!(scenario = %scenario, "unsaved edits outstanding, keeping local store");
                return Ok(false);
            }
            if state.revision != revision {
                debug!(scenario = %scenario, "store changed during load, discarding lines");
                return Ok(false);
            }
            state.mutator.replace_all(lines.iter().cloned());
        }

        info!(scenario = %scenario, lines = lines.len(), "scenario loaded");
        self.shared.notifier.emit(&SyncNotice::ScenarioLoaded {
            scenario,
            lines: lines.len(),
        });
        Ok(true)
    }

    async fn fetch(&self, scenario: &ScenarioId) -> Result<Arc<Vec<ForecastLine>>, SyncError> {
        let key = self.shared.cache_key(scenario);
        let label = key.to_string();
        let resource = self.shared.config.resource.clone();
        let backend = Arc::clone(&self.shared.backend);
        let scenario = scenario.clone();

        self.shared
            .coalescer
            .fetch(key, move || async move {
                let fetched = backend
                    .list(&resource, &scenario)
                    .await
                    .map_err(|err| SyncError::FetchFailed {
                        resource: label,
                        message: err.to_string(),
                    })?;
                let total = fetched.len();
                let lines: Vec<_> = fetched
                    .into_iter()
                    .filter(|line| line.key().scenario_id() == &scenario)
                    .collect();
                if lines.len() < total {
                    warn!(
                        scenario = %scenario,
                        dropped = total - lines.len(),
                        "backend returned lines from another scenario"
                    );
                }
                Ok(Arc::new(lines))
            })
            .await
    }

    pub fn coalescer_stats(&self) -> Result<CoalescerStats, SyncError> {
        self.shared.coalescer.stats()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }

    /// Listen for one kind of [`SyncNotice`], e.g. [`SyncNotice::PERSIST_FAILED`].
    /// The listener receives the notice as JSON.
    pub fn on_notice<F>(&self, event: &str, listener: F) -> Result<String, SyncError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.shared.notifier.on(event, listener)
    }

    /// Flush outstanding edits, then stop the flush driver.
    pub async fn shutdown(mut self) -> Result<(), SyncError> {
        let flushed = self.force_flush_now().await;
        self.close();
        if let Some(driver) = self.driver.take() {
            if driver.await.is_err() {
                warn!("flush driver panicked");
            }
        }
        flushed
    }

    fn close(&self) {
        if let Ok(mut state) = self.shared.state() {
            state.closed = true;
        }
        self.shared.wake.notify_one();
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.close();
    }
}
