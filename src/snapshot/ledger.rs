use std::sync::Arc;

use crate::forecast::MutationRequest;
use crate::store::KeyedRecordStore;

/// Holds the one store snapshot needed to undo unconfirmed edits.
///
/// The ledger is owned by a single mutator; nothing about it is global.
/// Lifecycle:
///
/// - [`retain`](Self::retain) on the first proposal after a quiet period
/// - [`seal`](Self::seal) when a batch starts flushing
/// - [`confirm`](Self::confirm) or [`rollback`](Self::rollback) when it settles
/// - [`discard`](Self::discard) on a scenario switch
#[derive(Debug, Default)]
pub struct SnapshotLedger {
    retained: Option<Arc<KeyedRecordStore>>,
    sealed: bool,
    follow_up: bool,
}

impl SnapshotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` as the rollback target unless one is already held.
    /// Returns true if a new snapshot was taken.
    pub fn retain(&mut self, current: &Arc<KeyedRecordStore>) -> bool {
        if self.sealed {
            self.follow_up = true;
        }
        if self.retained.is_some() {
            return false;
        }
        self.retained = Some(Arc::clone(current));
        true
    }

    /// Mark the start of a flush. Proposals after this point belong to the next batch.
    pub fn seal(&mut self) {
        self.sealed = true;
        self.follow_up = false;
    }

    /// The flushed batch was persisted.
    ///
    /// With no edits after the seal the snapshot is dropped. Otherwise it is
    /// rebased onto the confirmed state so the follow-up batch can still be
    /// undone on its own.
    pub fn confirm(&mut self, flushed: &[MutationRequest]) {
        if self.follow_up {
            if let Some(base) = self.retained.take() {
                self.retained = Some(Arc::new(base.apply_batch(flushed)));
            }
        } else {
            self.retained = None;
        }
        self.sealed = false;
        self.follow_up = false;
    }

    /// The flushed batch failed. Hands back the last known-good store, if any.
    pub fn rollback(&mut self) -> Option<Arc<KeyedRecordStore>> {
        self.sealed = false;
        self.follow_up = false;
        self.retained.take()
    }

    pub fn discard(&mut self) {
        self.retained = None;
        self.sealed = false;
        self.follow_up = false;
    }

    pub fn is_pending(&self) -> bool {
        self.retained.is_some()
    }

    pub fn retained(&self) -> Option<&Arc<KeyedRecordStore>> {
        self.retained.as_ref()
    }
}
