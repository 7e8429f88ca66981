//! Price forecast from a fitted ensemble
//!
//! The ensemble predicts the next-day return from the latest features. That
//! return, clipped, becomes the daily drift of a log-normal price path whose
//! band is widened by recent realized volatility.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc, Weekday};
use log::debug;
use serde::{Deserialize, Serialize};

use super::features::{self, FeatureMatrix};
use super::model::{self, Ensemble, Regressor};
use crate::error::ModelError;
use crate::market::PriceHistory;

/// Fewest daily bars a forecast is attempted with
pub const MIN_BARS: usize = 60;
/// Share of feature rows used for training; the rest is the backtest window
pub const TRAIN_FRACTION: f64 = 0.8;
/// Absolute cap on the daily drift
pub const MAX_DAILY_DRIFT: f64 = 0.03;
/// Daily volatility used when recent returns carry no information
pub const DEFAULT_VOLATILITY: f64 = 0.015;
/// Returns used to estimate volatility
pub const VOLATILITY_WINDOW: usize = 30;
/// Two-sided 95% normal quantile
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Upward,
    Downward,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Upward => write!(f, "upward"),
            Trend::Downward => write!(f, "downward"),
        }
    }
}

/// One projected trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub day: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Out-of-sample accuracy on the held-out tail of the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backtest {
    /// Mean absolute percentage error of next-day price, in percent
    pub mape: f64,
    pub r2: f64,
    pub train_size: usize,
    pub test_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub symbol: String,
    pub generated_at: DateTime<Utc>,
    pub last_date: NaiveDate,
    pub last_price: f64,
    pub horizon_days: usize,
    pub points: Vec<ForecastPoint>,
    pub trend: Trend,
    /// Change from last close to the final projected price, in percent
    pub change_percent: f64,
    pub daily_drift: f64,
    pub daily_volatility: f64,
    pub backtest: Backtest,
}

impl Forecast {
    pub fn final_price(&self) -> f64 {
        self.points.last().map_or(self.last_price, |p| p.price)
    }
}

/// Fit the ensemble on `history` and project `horizon` trading days ahead.
pub fn run(history: &PriceHistory, horizon: usize) -> Result<Forecast, ModelError> {
    let bars = &history.bars;
    if bars.len() < MIN_BARS {
        return Err(ModelError::InsufficientData {
            needed: MIN_BARS,
            got: bars.len(),
        });
    }
    let last = &bars[bars.len() - 1];

    let matrix = features::build(bars).ok_or(ModelError::InsufficientData {
        needed: MIN_BARS,
        got: bars.len(),
    })?;
    let split = ((matrix.len() as f64) * TRAIN_FRACTION).round() as usize;
    let split = split.clamp(1, matrix.len() - 1);

    let ensemble = Ensemble::fit_default(&matrix.rows[..split], &matrix.targets[..split])?;
    let backtest = backtest(&ensemble, &matrix, split);

    let predicted = ensemble.predict_one(&matrix.latest);
    let drift = if predicted.is_finite() {
        predicted.clamp(-MAX_DAILY_DRIFT, MAX_DAILY_DRIFT)
    } else {
        0.0
    };
    let closes = history.closes();
    let volatility = recent_volatility(&closes);
    debug!(
        "{}: predicted return {:.5}, drift {:.5}, volatility {:.5}",
        history.symbol, predicted, drift, volatility
    );

    let points = project(last.close, last.date, drift, volatility, horizon);
    let final_price = points.last().map_or(last.close, |p| p.price);
    let trend = if final_price > last.close {
        Trend::Upward
    } else {
        Trend::Downward
    };

    Ok(Forecast {
        symbol: history.symbol.clone(),
        generated_at: Utc::now(),
        last_date: last.date,
        last_price: last.close,
        horizon_days: horizon,
        points,
        trend,
        change_percent: round2((final_price - last.close) / last.close * 100.0),
        daily_drift: drift,
        daily_volatility: volatility,
        backtest,
    })
}

fn backtest(ensemble: &Ensemble, matrix: &FeatureMatrix, split: usize) -> Backtest {
    let test_rows = &matrix.rows[split..];
    let predicted: Vec<f64> = ensemble
        .predict(test_rows)
        .iter()
        .zip(&matrix.closes[split..])
        .map(|(r, close)| close * (1.0 + r))
        .collect();
    let actual: Vec<f64> = matrix.closes[split..]
        .iter()
        .zip(&matrix.targets[split..])
        .map(|(close, r)| close * (1.0 + r))
        .collect();

    Backtest {
        mape: round2(model::mape(&actual, &predicted)),
        r2: round4(model::r2(&actual, &predicted)),
        train_size: split,
        test_size: test_rows.len(),
    }
}

/// Sample deviation of the last daily returns, or the default when flat.
pub fn recent_volatility(closes: &[f64]) -> f64 {
    let returns = features::daily_returns(closes);
    let tail = &returns[returns.len().saturating_sub(VOLATILITY_WINDOW)..];
    let sigma = features::std_dev(tail);
    if sigma.is_finite() && sigma > 0.0 {
        sigma
    } else {
        DEFAULT_VOLATILITY
    }
}

/// Log-normal median path with a 95% band that widens with sqrt(day).
pub fn project(
    start_price: f64,
    start_date: NaiveDate,
    drift: f64,
    volatility: f64,
    horizon: usize,
) -> Vec<ForecastPoint> {
    let step = (1.0 + drift).ln() - volatility * volatility / 2.0;
    let mut date = start_date;
    (1..=horizon)
        .map(|day| {
            date = next_trading_day(date);
            let k = day as f64;
            let price = start_price * (k * step).exp();
            let spread = Z_95 * volatility * k.sqrt();
            ForecastPoint {
                day,
                date,
                price: round2(price),
                lower: round2(price * (-spread).exp()),
                upper: round2(price * spread.exp()),
            }
        })
        .collect()
}

fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + TimeDelta::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += TimeDelta::days(1);
    }
    next
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
