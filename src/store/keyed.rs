use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::forecast::{ForecastKey, ForecastLine, MutationRequest, Operation};

/// Canonical local view of forecast lines, indexed by composite key.
///
/// Lines are kept in insertion order. A key that is replaced keeps its
/// original position. Stores are values: [`apply_batch`](Self::apply_batch)
/// never touches `self`, which is what lets an earlier store serve as a
/// rollback snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedRecordStore {
    index: HashMap<ForecastKey, usize>,
    lines: Vec<ForecastLine>,
}

impl KeyedRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a bulk load. A repeated key keeps its first position
    /// and its last value.
    pub fn from_lines(lines: impl IntoIterator<Item = ForecastLine>) -> Self {
        let mut store = Self::new();
        store.replace_all(lines);
        store
    }

    pub fn get(&self, key: &ForecastKey) -> Option<&ForecastLine> {
        self.index.get(key).map(|&pos| &self.lines[pos])
    }

    pub fn contains(&self, key: &ForecastKey) -> bool {
        self.index.contains_key(key)
    }

    /// All lines in insertion order.
    pub fn list(&self) -> &[ForecastLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_revenue(&self) -> Decimal {
        self.lines.iter().map(ForecastLine::derived_revenue).sum()
    }

    /// Discard every line and load `lines` in their place.
    pub fn replace_all(&mut self, lines: impl IntoIterator<Item = ForecastLine>) {
        self.index.clear();
        self.lines.clear();
        for line in lines {
            self.upsert(line);
        }
    }

    /// Return a new store with `mutations` applied in order. `self` is unchanged.
    pub fn apply_batch(&self, mutations: &[MutationRequest]) -> Self {
        let mut next = self.clone();
        for mutation in mutations {
            next.apply(mutation);
        }
        next
    }

    fn apply(&mut self, mutation: &MutationRequest) {
        let existing = self.index.get(&mutation.key).copied();
        match (mutation.operation, existing) {
            (Operation::Replace, _) | (Operation::Add, None) => {
                let price = mutation.unit_price.unwrap_or(Decimal::ZERO);
                self.upsert(ForecastLine::new(
                    mutation.key.clone(),
                    mutation.quantity,
                    price,
                ));
            }
            (Operation::Add, Some(pos)) => {
                let line = &mut self.lines[pos];
                let quantity = line.quantity() + mutation.quantity;
                let price = mutation.unit_price.unwrap_or_else(|| line.unit_price());
                line.set(quantity, price);
            }
            (Operation::Subtract, Some(pos)) => {
                let line = &mut self.lines[pos];
                let quantity = (line.quantity() - mutation.quantity).max(Decimal::ZERO);
                let price = line.unit_price();
                line.set(quantity, price);
            }
            // Nothing to subtract from.
            (Operation::Subtract, None) => {}
        }
    }

    fn upsert(&mut self, line: ForecastLine) {
        match self.index.get(line.key()) {
            Some(&pos) => self.lines[pos] = line,
            None => {
                self.index.insert(line.key().clone(), self.lines.len());
                self.lines.push(line);
            }
        }
    }
}
