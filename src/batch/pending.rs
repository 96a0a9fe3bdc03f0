use crate::forecast::MutationRequest;

/// Mutations sealed together for one persistence call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    /// Monotonic per engine; later batches always flush after earlier ones.
    pub seq: u64,
    pub mutations: Vec<MutationRequest>,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}
