//! Price forecasting
//!
//! [`features`] turns daily bars into a feature matrix, [`model`] holds the
//! tree ensemble, [`engine`] fits it and projects a price path, and [`gate`]
//! serves forecasts without ever persisting them.

pub mod engine;
pub mod features;
pub mod gate;
pub mod model;

pub use engine::{Backtest, Forecast, ForecastPoint, Trend};
pub use gate::{GateConfig, InferenceGate};
