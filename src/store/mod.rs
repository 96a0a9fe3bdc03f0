//! Local forecast state: the keyed store and the optimistic mutator that owns it.

mod keyed;
mod mutator;

pub use keyed::KeyedRecordStore;
pub use mutator::OptimisticMutator;
