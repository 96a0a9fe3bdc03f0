mod ledger;

pub use ledger::SnapshotLedger;
