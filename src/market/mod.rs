//! Market data producers
//!
//! [`MarketDataApi`] is the seam between the cache and the remote sources:
//! [`MarketClient`] talks to Yahoo Finance and NewsAPI, and
//! [`CachedMarketData`] routes every call through the fetch coordinator.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod cached;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod rate_limit;

pub use cached::{CachedMarketData, Resource};
pub use client::MarketClient;
#[cfg(test)]
pub use mock::MockMarketClient;

/// Ranges accepted by the history endpoint
pub const HISTORY_RANGES: [&str; 10] = [
    "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

pub const DEFAULT_HISTORY_RANGE: &str = "1y";

pub fn is_valid_range(range: &str) -> bool {
    HISTORY_RANGES.contains(&range.trim().to_ascii_lowercase().as_str())
}

/// Remote market data source.
///
/// Implementations perform exactly one remote operation per call and have
/// no cache side effects.
#[async_trait]
pub trait MarketDataApi: Send + Sync {
    /// Quote and summary statistics for one symbol
    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals>;

    /// Daily OHLCV bars over `range` (see [`HISTORY_RANGES`])
    async fn history(&self, symbol: &str, range: &str) -> Result<PriceHistory>;

    /// Recent articles mentioning the company behind `symbol`
    async fn company_news(&self, symbol: &str) -> Result<Vec<NewsArticle>>;

    /// Recent general market articles
    async fn market_news(&self) -> Result<Vec<NewsArticle>>;

    /// Headline index quotes
    async fn indices(&self) -> Result<Vec<IndexQuote>>;
}

/// Company quote and summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub symbol: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Current market price
    pub price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,
    pub volume: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifty_two_week_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fifty_day_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_hundred_day_avg: Option<f64>,
}

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily bars for a symbol, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: String,
    pub range: String,
    pub bars: Vec<PriceBar>,
}

impl PriceHistory {
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Drop all but the most recent `n` bars
    pub fn keep_latest(&mut self, n: usize) {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.drain(..skip);
    }
}

/// A news article as returned by the news source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl NewsArticle {
    /// Title and description joined for scoring
    pub fn text(&self) -> String {
        match self.description.as_deref() {
            Some(desc) if !desc.trim().is_empty() => format!("{}. {}", self.title, desc),
            _ => self.title.clone(),
        }
    }
}

/// Latest value of a market index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub symbol: String,
    pub name: String,
    pub value: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Percentage change from `previous` to `current`, 0 when undefined
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}
