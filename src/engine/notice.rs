use std::sync::{Mutex, MutexGuard};

use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::forecast::ScenarioId;

/// Asynchronous notification for the UI layer.
///
/// Delivered as JSON strings through an [`EventEmitter`] under
/// [`event_name`](Self::event_name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncNotice {
    /// A batch write failed. `rolled_back` is false only when there was no
    /// snapshot to restore.
    PersistFailed {
        scenario: ScenarioId,
        batch: u64,
        message: String,
        rolled_back: bool,
    },
    PersistConfirmed {
        scenario: ScenarioId,
        batch: u64,
        lines: usize,
    },
    ScenarioLoaded {
        scenario: ScenarioId,
        lines: usize,
    },
    LoadFailed {
        scenario: ScenarioId,
        message: String,
    },
}

impl SyncNotice {
    pub const PERSIST_FAILED: &'static str = "persist_failed";
    pub const PERSIST_CONFIRMED: &'static str = "persist_confirmed";
    pub const SCENARIO_LOADED: &'static str = "scenario_loaded";
    pub const LOAD_FAILED: &'static str = "load_failed";

    pub fn event_name(&self) -> &'static str {
        match self {
            SyncNotice::PersistFailed { .. } => Self::PERSIST_FAILED,
            SyncNotice::PersistConfirmed { .. } => Self::PERSIST_CONFIRMED,
            SyncNotice::ScenarioLoaded { .. } => Self::SCENARIO_LOADED,
            SyncNotice::LoadFailed { .. } => Self::LOAD_FAILED,
        }
    }

    /// Decode a payload received by a listener.
    pub fn from_json(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}

/// Fan-out of [`SyncNotice`]s to in-process listeners.
///
/// Listeners run on the emitter's own threads, never on the engine's task.
pub struct Notifier {
    emitter: Mutex<EventEmitter>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Notifier {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    fn emitter(&self) -> Result<MutexGuard<'_, EventEmitter>, SyncError> {
        self.emitter
            .lock()
            .map_err(|_| SyncError::LockPoisoned("notifier"))
    }

    /// Register a listener for one notice kind. Returns the listener id.
    pub fn on<F>(&self, event: &str, listener: F) -> Result<String, SyncError>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Ok(self.emitter()?.on(event, listener))
    }

    pub fn remove_listener(&self, id: &str) -> Result<bool, SyncError> {
        Ok(self.emitter()?.remove_listener(id).is_some())
    }

    pub fn emit(&self, notice: &SyncNotice) {
        let payload = match serde_json::to_string(notice) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "could not encode notice");
                return;
            }
        };
        if let Ok(mut emitter) = self.emitter() {
            emitter.emit(notice.event_name(), payload);
        }
    }
}
