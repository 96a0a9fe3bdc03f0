use std::collections::HashSet;
use std::sync::Arc;

use crate::forecast::{ForecastLine, MutationRequest};
use crate::snapshot::SnapshotLedger;

use super::keyed::KeyedRecordStore;

/// Applies proposed mutations to the live store before the network confirms them.
///
/// The live store is an `Arc` that is swapped wholesale on every change, so a
/// reader holding the previous `Arc` never observes a half-applied batch.
#[derive(Debug)]
pub struct OptimisticMutator {
    live: Arc<KeyedRecordStore>,
    ledger: SnapshotLedger,
}

impl Default for OptimisticMutator {
    fn default() -> Self {
        Self::new(SnapshotLedger::new())
    }
}

impl OptimisticMutator {
    pub fn new(ledger: SnapshotLedger) -> Self {
        OptimisticMutator {
            live: Arc::new(KeyedRecordStore::new()),
            ledger,
        }
    }

    /// The current optimistic view.
    pub fn live(&self) -> &Arc<KeyedRecordStore> {
        &self.live
    }

    pub fn ledger(&self) -> &SnapshotLedger {
        &self.ledger
    }

    /// Apply `mutations` and publish the result as the live store.
    pub fn propose(&mut self, mutations: &[MutationRequest]) -> Arc<KeyedRecordStore> {
        self.ledger.retain(&self.live);
        self.live = Arc::new(self.live.apply_batch(mutations));
        Arc::clone(&self.live)
    }

    /// Wholesale reload. Any outstanding snapshot is dropped.
    pub fn replace_all(&mut self, lines: impl IntoIterator<Item = ForecastLine>) {
        self.ledger.discard();
        self.live = Arc::new(KeyedRecordStore::from_lines(lines));
    }

    /// A batch is about to be written.
    pub fn seal(&mut self) {
        self.ledger.seal();
    }

    pub fn confirm(&mut self, flushed: &[MutationRequest]) {
        self.ledger.confirm(flushed);
    }

    /// Restore the last known-good store. Returns false if nothing was retained.
    pub fn rollback(&mut self) -> bool {
        match self.ledger.rollback() {
            Some(snapshot) => {
                self.live = snapshot;
                true
            }
            None => false,
        }
    }

    /// Resolve the lines a batch touched, in first-touch order, to their
    /// current optimistic values. Keys absent from the store are skipped.
    pub fn resolve(&self, mutations: &[MutationRequest]) -> Vec<ForecastLine> {
        let mut seen = HashSet::new();
        mutations
            .iter()
            .filter(|m| seen.insert(&m.key))
            .filter_map(|m| self.live.get(&m.key).cloned())
            .collect()
    }

    pub fn has_outstanding(&self) -> bool {
        self.ledger.is_pending()
    }
}
