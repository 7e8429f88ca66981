//! Mock market data source for testing
//!
//! Serves deterministic synthetic data, counts calls per method and can be
//! told to fail or to stall so cache and gate behaviour can be observed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta, Utc};

use super::client::needs_exchange_suffix;
use super::{Fundamentals, IndexQuote, MarketDataApi, NewsArticle, PriceBar, PriceHistory};
use crate::cache::normalize_symbol;
use crate::error::{ApiError, Result};

/// Calls made per method
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub fundamentals: usize,
    pub history: usize,
    pub company_news: usize,
    pub market_news: usize,
    pub indices: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.fundamentals + self.history + self.company_news + self.market_news + self.indices
    }
}

#[derive(Default)]
struct Counters {
    fundamentals: AtomicUsize,
    history: AtomicUsize,
    company_news: AtomicUsize,
    market_news: AtomicUsize,
    indices: AtomicUsize,
}

/// Mock market data client.
///
/// Clones share their counters and switches, so a test can keep a handle
/// after moving the mock into a service.
#[derive(Clone)]
pub struct MockMarketClient {
    counters: Arc<Counters>,
    failing: Arc<AtomicBool>,
    delay: Duration,
    bars: usize,
}

impl Default for MockMarketClient {
    fn default() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            failing: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
            bars: 250,
        }
    }
}

impl MockMarketClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of daily bars served by `history`
    pub fn with_bars(mut self, bars: usize) -> Self {
        self.bars = bars;
        self
    }

    /// Make every subsequent call fail with a server error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            fundamentals: self.counters.fundamentals.load(Ordering::SeqCst),
            history: self.counters.history.load(Ordering::SeqCst),
            company_news: self.counters.company_news.load(Ordering::SeqCst),
            market_news: self.counters.market_news.load(Ordering::SeqCst),
            indices: self.counters.indices.load(Ordering::SeqCst),
        }
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::ServerError("mock upstream unavailable".to_string()).into());
        }
        Ok(())
    }
}

/// Deterministic trending price series with a weekly wobble
pub fn synthetic_bars(count: usize) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..count)
        .map(|i| {
            let t = i as f64;
            let close = 1000.0 * (1.0 + 0.0008 * t) + 15.0 * (t / 5.0).sin();
            PriceBar {
                date: start + TimeDelta::days(i as i64),
                open: close - 3.0 * (t / 3.0).cos(),
                high: close + 8.0,
                low: close - 8.0,
                close,
                volume: 100_000 + (i as u64 % 7) * 5_000,
            }
        })
        .collect()
}

/// Bare tickers resolve to their NSE listing, as with the live client
fn resolve(symbol: &str) -> String {
    let symbol = normalize_symbol(symbol);
    if needs_exchange_suffix(&symbol) {
        format!("{}.NS", symbol)
    } else {
        symbol
    }
}

fn article(title: &str, hours_ago: i64) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        description: None,
        url: format!("https://news.example.com/{}", title.len()),
        source: "Mock Wire".to_string(),
        published_at: Some(Utc::now() - TimeDelta::hours(hours_ago)),
    }
}

#[async_trait]
impl MarketDataApi for MockMarketClient {
    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        self.enter(&self.counters.fundamentals).await?;
        let symbol = resolve(symbol);
        Ok(Fundamentals {
            name: symbol.trim_end_matches(".NS").to_string(),
            symbol,
            exchange: Some("NSI".to_string()),
            currency: Some("INR".to_string()),
            price: 1210.0,
            previous_close: 1200.0,
            change: 10.0,
            change_percent: 0.83,
            open: Some(1201.0),
            day_high: Some(1215.0),
            day_low: Some(1198.0),
            volume: 150_000,
            fifty_two_week_high: Some(1300.0),
            fifty_two_week_low: Some(950.0),
            fifty_day_avg: Some(1180.0),
            two_hundred_day_avg: Some(1100.0),
        })
    }

    async fn history(&self, symbol: &str, range: &str) -> Result<PriceHistory> {
        self.enter(&self.counters.history).await?;
        Ok(PriceHistory {
            symbol: resolve(symbol),
            range: range.to_ascii_lowercase(),
            bars: synthetic_bars(self.bars),
        })
    }

    async fn company_news(&self, symbol: &str) -> Result<Vec<NewsArticle>> {
        self.enter(&self.counters.company_news).await?;
        let name = normalize_symbol(symbol);
        Ok(vec![
            article(&format!("{} posts record profit and strong growth", name), 2),
            article(&format!("{} shares fall after weak guidance", name), 20),
            article(&format!("{} board meeting scheduled", name), 40),
        ])
    }

    async fn market_news(&self) -> Result<Vec<NewsArticle>> {
        self.enter(&self.counters.market_news).await?;
        Ok(vec![
            article("Sensex surges to record high on strong inflows", 1),
            article("Nifty gains as banks rally", 5),
        ])
    }

    async fn indices(&self) -> Result<Vec<IndexQuote>> {
        self.enter(&self.counters.indices).await?;
        Ok(vec![
            IndexQuote {
                symbol: "^NSEI".to_string(),
                name: "NIFTY 50".to_string(),
                value: 22110.0,
                previous_close: 22000.0,
                change: 110.0,
                change_percent: 0.5,
            },
            IndexQuote {
                symbol: "^BSESN".to_string(),
                name: "SENSEX".to_string(),
                value: 72800.0,
                previous_close: 72900.0,
                change: -100.0,
                change_percent: -0.14,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let mock = MockMarketClient::new();
        mock.fundamentals("TCS.NS").await.unwrap();
        mock.history("TCS.NS", "1y").await.unwrap();
        mock.history("TCS.NS", "6mo").await.unwrap();

        let counts = mock.call_counts();
        assert_eq!(counts.fundamentals, 1);
        assert_eq!(counts.history, 2);
        assert_eq!(counts.total(), 3);
    }

    #[tokio::test]
    async fn test_mock_resolves_bare_tickers() {
        let mock = MockMarketClient::new();
        assert_eq!(mock.fundamentals("tcs").await.unwrap().symbol, "TCS.NS");
        assert_eq!(mock.history("TCS", "1y").await.unwrap().symbol, "TCS.NS");
        assert_eq!(mock.history("^NSEI", "1y").await.unwrap().symbol, "^NSEI");
    }

    #[tokio::test]
    async fn test_mock_failure_toggle_shared_by_clones() {
        let mock = MockMarketClient::new();
        let handle = mock.clone();

        handle.set_failing(true);
        assert!(mock.indices().await.is_err());

        handle.set_failing(false);
        assert_eq!(mock.indices().await.unwrap().len(), 2);
        assert_eq!(handle.call_counts().indices, 2);
    }

    #[test]
    fn test_synthetic_bars_are_deterministic() {
        let a = synthetic_bars(30);
        let b = synthetic_bars(30);
        assert_eq!(a, b);
        assert!(a.iter().all(|bar| bar.low < bar.close && bar.close < bar.high));
    }
}
