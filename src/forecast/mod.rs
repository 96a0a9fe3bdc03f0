//! Forecast data model: composite keys, lines, and proposed mutations.

mod key;
mod line;
mod mutation;

pub use key::{ForecastKey, ScenarioId};
pub use line::ForecastLine;
pub use mutation::{MutationRequest, Operation};
