use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::key::ForecastKey;

/// One forecast line: quantity and unit price for a composite key.
///
/// `derived_revenue` is always `quantity * unit_price`. It is serialized for
/// consumers but recomputed on every construction, including when a line is
/// decoded from a network payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawForecastLine")]
pub struct ForecastLine {
    key: ForecastKey,
    quantity: Decimal,
    unit_price: Decimal,
    derived_revenue: Decimal,
}

impl ForecastLine {
    /// Build a line. Negative inputs are clamped to zero.
    pub fn new(key: ForecastKey, quantity: Decimal, unit_price: Decimal) -> Self {
        let quantity = quantity.max(Decimal::ZERO);
        let unit_price = unit_price.max(Decimal::ZERO);
        ForecastLine {
            key,
            quantity,
            unit_price,
            derived_revenue: quantity * unit_price,
        }
    }

    pub fn key(&self) -> &ForecastKey {
        &self.key
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn derived_revenue(&self) -> Decimal {
        self.derived_revenue
    }

    /// Replace both inputs at once, recomputing revenue.
    pub(crate) fn set(&mut self, quantity: Decimal, unit_price: Decimal) {
        *self = ForecastLine::new(self.key.clone(), quantity, unit_price);
    }
}

#[derive(Deserialize)]
struct RawForecastLine {
    key: ForecastKey,
    quantity: Decimal,
    unit_price: Decimal,
    // Accepted for wire compatibility, never trusted.
    #[serde(default)]
    #[allow(dead_code)]
    derived_revenue: Option<Decimal>,
}

impl From<RawForecastLine> for ForecastLine {
    fn from(raw: RawForecastLine) -> Self {
        ForecastLine::new(raw.key, raw.quantity, raw.unit_price)
    }
}
