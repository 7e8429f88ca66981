//! Inference gate
//!
//! Forecasts are never stored. Each call fits a fresh model, but concurrent
//! calls for one symbol share a single fit and receive the same `Arc`.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use super::engine::{self, Forecast};
use crate::cache::{SingleFlight, normalize_symbol};
use crate::error::FetchError;
use crate::market::{CachedMarketData, DEFAULT_HISTORY_RANGE, MarketDataApi};

/// Forecast settings applied to every prediction
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub horizon_days: usize,
    pub history_range: String,
    /// Bound on history fetch plus fitting
    pub timeout: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            history_range: DEFAULT_HISTORY_RANGE.to_string(),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

pub struct InferenceGate<C: MarketDataApi + 'static> {
    market: Arc<CachedMarketData<C>>,
    flights: SingleFlight<String, Arc<Forecast>>,
    config: GateConfig,
}

impl<C: MarketDataApi + 'static> InferenceGate<C> {
    pub fn new(market: Arc<CachedMarketData<C>>, config: GateConfig) -> Self {
        Self {
            market,
            flights: SingleFlight::new(),
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Forecast `symbol`, joining a fit already running for it.
    pub async fn predict(&self, symbol: &str) -> Result<Arc<Forecast>, FetchError> {
        let symbol = normalize_symbol(symbol);
        let market = Arc::clone(&self.market);
        let config = self.config.clone();
        let task_symbol = symbol.clone();
        self.flights
            .run(symbol, move || forecast(market, task_symbol, config))
            .await
    }

    pub fn is_predicting(&self, symbol: &str) -> bool {
        self.flights.is_in_flight(&normalize_symbol(symbol))
    }
}

async fn forecast<C: MarketDataApi + 'static>(
    market: Arc<CachedMarketData<C>>,
    symbol: String,
    config: GateConfig,
) -> Result<Arc<Forecast>, FetchError> {
    let work = async {
        let history = market
            .history(&symbol, &config.history_range)
            .await
            .map_err(|e| {
                FetchError::Producer(format!("history unavailable for {}: {}", symbol, e))
            })?;
        debug!(
            "Fitting forecast for {} on {} bars ({:?})",
            symbol,
            history.value.bars.len(),
            history.provenance
        );

        let horizon = config.horizon_days;
        let forecast = tokio::task::spawn_blocking(move || engine::run(&history.value, horizon))
            .await
            .map_err(|e| FetchError::Producer(format!("model task failed: {}", e)))?
            .map_err(|e| FetchError::Producer(e.to_string()))?;

        info!(
            "Forecast for {}: {} {:+.2}% over {} days",
            symbol, forecast.trend, forecast.change_percent, forecast.horizon_days
        );
        Ok(Arc::new(forecast))
    };

    match config.timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| FetchError::Timeout(limit))?,
        None => work.await,
    }
}
