//! stockcast - cached market data and on-demand price forecasts
//!
//! Market data flows through a freshness-aware cache
//! ([`cache::FetchCoordinator`]); forecasts are computed on demand behind an
//! [`forecast::InferenceGate`] and never stored. [`indicators`] summarizes
//! cached price history for analysis.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod forecast;
pub mod indicators;
pub mod market;
pub mod output;
pub mod sentiment;
pub mod service;

pub use error::{Error, Result};
