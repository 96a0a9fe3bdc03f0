use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Identifier of a planning scenario (e.g. `F001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        ScenarioId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(id: &str) -> Self {
        ScenarioId::new(id)
    }
}

impl From<String> for ScenarioId {
    fn from(id: String) -> Self {
        ScenarioId(id)
    }
}

/// Composite business key of a forecast line.
///
/// All four components are required; a key with a blank component cannot be
/// constructed, whether built in code or decoded from a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawForecastKey")]
pub struct ForecastKey {
    product_id: String,
    customer_id: String,
    period: String,
    scenario_id: ScenarioId,
}

impl ForecastKey {
    pub fn new(
        product_id: impl Into<String>,
        customer_id: impl Into<String>,
        period: impl Into<String>,
        scenario_id: impl Into<ScenarioId>,
    ) -> Result<Self, SyncError> {
        let key = ForecastKey {
            product_id: product_id.into(),
            customer_id: customer_id.into(),
            period: period.into(),
            scenario_id: scenario_id.into(),
        };
        key.validate()?;
        Ok(key)
    }

    fn validate(&self) -> Result<(), SyncError> {
        let components = [
            ("product_id", self.product_id.as_str()),
            ("customer_id", self.customer_id.as_str()),
            ("period", self.period.as_str()),
            ("scenario_id", self.scenario_id.as_str()),
        ];
        for (name, value) in components {
            if value.trim().is_empty() {
                return Err(SyncError::invalid(format!(
                    "forecast key is missing {}",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn scenario_id(&self) -> &ScenarioId {
        &self.scenario_id
    }
}

impl fmt::Display for ForecastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.product_id, self.customer_id, self.period, self.scenario_id
        )
    }
}

#[derive(Deserialize)]
struct RawForecastKey {
    product_id: String,
    customer_id: String,
    period: String,
    scenario_id: ScenarioId,
}

impl TryFrom<RawForecastKey> for ForecastKey {
    type Error = SyncError;

    fn try_from(raw: RawForecastKey) -> Result<Self, Self::Error> {
        ForecastKey::new(raw.product_id, raw.customer_id, raw.period, raw.scenario_id)
    }
}
