use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::key::{ForecastKey, ScenarioId};
use crate::error::SyncError;

/// How a mutation combines with the line already stored under its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Replace,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => write!(f, "add"),
            Operation::Subtract => write!(f, "subtract"),
            Operation::Replace => write!(f, "replace"),
        }
    }
}

/// A proposed change to one forecast line.
///
/// Nothing is mutated until the request is applied by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub key: ForecastKey,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    pub operation: Operation,
}

impl MutationRequest {
    pub fn add(key: ForecastKey, quantity: Decimal) -> Self {
        MutationRequest {
            key,
            quantity,
            unit_price: None,
            operation: Operation::Add,
        }
    }

    pub fn subtract(key: ForecastKey, quantity: Decimal) -> Self {
        MutationRequest {
            key,
            quantity,
            unit_price: None,
            operation: Operation::Subtract,
        }
    }

    pub fn replace(key: ForecastKey, quantity: Decimal, unit_price: Decimal) -> Self {
        MutationRequest {
            key,
            quantity,
            unit_price: Some(unit_price),
            operation: Operation::Replace,
        }
    }

    /// Attach (or override) the incoming unit price.
    pub fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    /// Check the request before it reaches a store for `scenario`.
    pub fn validate_for(&self, scenario: &ScenarioId) -> Result<(), SyncError> {
        if self.key.scenario_id() != scenario {
            return Err(SyncError::invalid(format!(
                "{} targets scenario {} but {} is active",
                self.key,
                self.key.scenario_id(),
                scenario
            )));
        }
        if self.quantity < Decimal::ZERO {
            return Err(SyncError::invalid(format!(
                "negative quantity {} for {}",
                self.quantity, self.key
            )));
        }
        if let Some(price) = self.unit_price {
            if price < Decimal::ZERO {
                return Err(SyncError::invalid(format!(
                    "negative unit price {} for {}",
                    price, self.key
                )));
            }
        }
        Ok(())
    }
}
