//! Consumer facade over the cache, the market data sources and the gate
//!
//! Everything a front end needs goes through [`StockService`]: raw cached
//! fetches by `(category, key)`, typed helpers, forecasts and maintenance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::cache::{
    CacheStats, Cached, Category, FetchCoordinator, Fetched, InvalidateScope, MARKET_KEY,
    Provenance, normalize_symbol,
};
use crate::config::Config;
use crate::error::{FetchError, ModelError, Result};
use crate::forecast::{Forecast, GateConfig, InferenceGate};
use crate::indicators::TechnicalIndicators;
use crate::market::{
    CachedMarketData, Fundamentals, IndexQuote, MarketClient, MarketDataApi, NewsArticle,
    PriceHistory,
};
use crate::sentiment::{self, ScoredArticle, SentimentSummary};

/// Scored news for a company or the whole market
#[derive(Debug, Clone, Serialize)]
pub struct NewsReport {
    /// Symbol, or `market` for market-wide news
    pub subject: String,
    pub summary: SentimentSummary,
    pub articles: Vec<ScoredArticle>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

/// Everything known about one symbol
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub symbol: String,
    pub fundamentals: Fundamentals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news: Option<NewsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<TechnicalIndicators>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    /// Parts that could not be produced
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Some part was served from an expired entry
    pub outdated: bool,
}

/// Index levels plus market-wide news
#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub indices: Vec<IndexQuote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news: Option<NewsReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub outdated: bool,
}

pub struct StockService<C: MarketDataApi + 'static> {
    market: Arc<CachedMarketData<C>>,
    gate: InferenceGate<C>,
}

impl StockService<MarketClient> {
    /// Build the production service from configuration.
    pub fn from_config(config: &Config, no_cache: bool) -> Result<Self> {
        let coordinator = FetchCoordinator::open(config.cache_dir.as_deref(), !no_cache)
            .with_producer_timeout(config.producer_timeout());
        let client = MarketClient::new(config.news_api_key.clone())?;
        Ok(Self::new(client, Arc::new(coordinator), config.gate_config()))
    }
}

impl<C: MarketDataApi + 'static> StockService<C> {
    pub fn new(source: C, coordinator: Arc<FetchCoordinator>, gate: GateConfig) -> Self {
        let market = Arc::new(CachedMarketData::new(source, coordinator));
        Self {
            gate: InferenceGate::new(Arc::clone(&market), gate),
            market,
        }
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        self.market.coordinator()
    }

    /// Cached payload for `(category, key)`
    pub async fn fetch(
        &self,
        category: Category,
        key: &str,
    ) -> std::result::Result<Fetched, FetchError> {
        self.market.fetch_raw(category, key).await
    }

    pub fn invalidate(&self, scope: &InvalidateScope) -> Result<usize> {
        Ok(self.coordinator().invalidate(scope)?)
    }

    /// Fresh forecast; never read from or written to the store
    pub async fn predict(&self, symbol: &str) -> std::result::Result<Arc<Forecast>, FetchError> {
        self.gate.predict(symbol).await
    }

    pub fn stats(&self) -> Result<Option<CacheStats>> {
        self.coordinator().stats()
    }

    pub async fn fundamentals(&self, symbol: &str) -> Result<Cached<Fundamentals>> {
        self.market.fundamentals(symbol).await
    }

    pub async fn history(&self, symbol: &str, range: &str) -> Result<Cached<PriceHistory>> {
        self.market.history(symbol, range).await
    }

    /// Technical indicators computed from cached history
    pub async fn indicators(
        &self,
        symbol: &str,
        range: &str,
    ) -> Result<Cached<TechnicalIndicators>> {
        let history = self.history(symbol, range).await?;
        let value = TechnicalIndicators::from_history(&history.value)
            .ok_or(ModelError::InsufficientData { needed: 1, got: 0 })?;
        Ok(Cached {
            value,
            provenance: history.provenance,
            stored_at: history.stored_at,
        })
    }

    /// Company news scored for sentiment, newest first, at most `limit` listed
    pub async fn company_news(&self, symbol: &str, limit: usize) -> Result<NewsReport> {
        let news = self.market.company_news(symbol).await?;
        Ok(report(normalize_symbol(symbol), news, limit))
    }

    pub async fn market_news(&self, limit: usize) -> Result<NewsReport> {
        let news = self.market.market_news().await?;
        Ok(report(MARKET_KEY.to_string(), news, limit))
    }

    pub async fn indices(&self) -> Result<Cached<Vec<IndexQuote>>> {
        self.market.indices().await
    }

    /// Fundamentals, news sentiment, technical indicators and a forecast.
    ///
    /// Fundamentals are fetched first and are the only required part; the
    /// symbol they resolve to (a bare ticker may become `TICKER.NS`) keys the
    /// rest, which are gathered concurrently. Their failures become warnings.
    pub async fn analyze(&self, symbol: &str, news_limit: usize) -> Result<Analysis> {
        let fundamentals = self.fundamentals(symbol).await?;
        let resolved = fundamentals.value.symbol.clone();

        let (history, news, forecast) = tokio::join!(
            self.history(&resolved, &self.gate.config().history_range),
            self.company_news(&resolved, news_limit),
            self.predict(&resolved)
        );

        let mut warnings = Vec::new();
        let mut outdated = fundamentals.provenance.is_outdated();
        let indicators = match history {
            Ok(history) => {
                outdated |= history.provenance.is_outdated();
                TechnicalIndicators::from_history(&history.value)
            }
            Err(e) => {
                warn!("Indicators unavailable for {}: {}", resolved, e);
                warnings.push(format!("indicators: {}", e));
                None
            }
        };
        let news = match news {
            Ok(report) => {
                outdated |= report.provenance.is_outdated();
                Some(report)
            }
            Err(e) => {
                warn!("News unavailable for {}: {}", resolved, e);
                warnings.push(format!("news: {}", e));
                None
            }
        };
        let forecast = match forecast {
            Ok(forecast) => Some(forecast.as_ref().clone()),
            Err(e) => {
                warn!("Forecast unavailable for {}: {}", resolved, e);
                warnings.push(format!("forecast: {}", e));
                None
            }
        };

        Ok(Analysis {
            symbol: resolved,
            fundamentals: fundamentals.value,
            news,
            indicators,
            forecast,
            warnings,
            outdated,
        })
    }

    /// Index quotes plus market news; news is optional.
    pub async fn market_summary(&self, news_limit: usize) -> Result<MarketSummary> {
        let (indices, news) = tokio::join!(self.indices(), self.market_news(news_limit));
        let indices = indices?;

        let mut warnings = Vec::new();
        let mut outdated = indices.provenance.is_outdated();
        let news = match news {
            Ok(report) => {
                outdated |= report.provenance.is_outdated();
                Some(report)
            }
            Err(e) => {
                warn!("Market news unavailable: {}", e);
                warnings.push(format!("news: {}", e));
                None
            }
        };

        Ok(MarketSummary {
            indices: indices.value,
            news,
            warnings,
            outdated,
        })
    }
}

fn report(subject: String, news: Cached<Vec<NewsArticle>>, limit: usize) -> NewsReport {
    let mut articles = sentiment::score_articles(news.value);
    let summary = sentiment::summarize(&articles);
    articles.truncate(limit);
    NewsReport {
        subject,
        summary,
        articles,
        provenance: news.provenance,
        stored_at: news.stored_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStorage, TtlPolicy};
    use crate::market::MockMarketClient;
    use crate::sentiment::SentimentLabel;
    use std::time::Duration;
    use tempfile::TempDir;

    fn service(mock: MockMarketClient) -> (StockService<MockMarketClient>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path(), TtlPolicy::standard()).unwrap();
        let gate = GateConfig {
            horizon_days: 3,
            timeout: None,
            ..GateConfig::default()
        };
        (
            StockService::new(mock, Arc::new(FetchCoordinator::new(storage)), gate),
            dir,
        )
    }

    #[tokio::test]
    async fn test_fetch_by_category_and_key() {
        let mock = MockMarketClient::new();
        let (service, _dir) = service(mock.clone());

        let first = service.fetch(Category::Indices, "market").await.unwrap();
        let second = service.fetch(Category::Indices, "MARKET").await.unwrap();
        assert_eq!(first.provenance, Provenance::Fresh);
        assert_eq!(second.provenance, Provenance::Cached);
        assert_eq!(first.payload, second.payload);
        assert_eq!(mock.call_counts().indices, 1);
    }

    #[tokio::test]
    async fn test_company_news_report() {
        let (service, _dir) = service(MockMarketClient::new());

        let report = service.company_news("tcs.ns", 2).await.unwrap();
        assert_eq!(report.subject, "TCS.NS");
        assert_eq!(report.articles.len(), 2);
        // Counts cover every article, not just the listed ones
        let total = report.summary.positive_count
            + report.summary.negative_count
            + report.summary.neutral_count;
        assert_eq!(total, 3);
        assert!(report.articles[0].article.title.contains("record profit"));
    }

    #[tokio::test]
    async fn test_market_summary() {
        let (service, _dir) = service(MockMarketClient::new());

        let summary = service.market_summary(10).await.unwrap();
        assert_eq!(summary.indices.len(), 2);
        let news = summary.news.unwrap();
        assert_eq!(news.subject, "market");
        assert_eq!(news.summary.label, SentimentLabel::Positive);
        assert!(summary.warnings.is_empty());
        assert!(!summary.outdated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_analyze_gathers_everything() {
        let mock = MockMarketClient::new();
        let (service, _dir) = service(mock.clone());

        let analysis = service.analyze("TCS.NS", 5).await.unwrap();
        assert_eq!(analysis.symbol, "TCS.NS");
        assert_eq!(analysis.fundamentals.price, 1210.0);
        assert_eq!(analysis.news.unwrap().articles.len(), 3);
        assert_eq!(analysis.forecast.unwrap().points.len(), 3);
        let indicators = analysis.indicators.unwrap();
        assert_eq!(indicators.dates.len(), 250);
        assert!(indicators.latest.rsi.is_some());
        assert!(indicators.latest.price_vs_sma200.is_some());
        assert!(analysis.warnings.is_empty());

        let counts = mock.call_counts();
        assert_eq!(counts.fundamentals, 1);
        assert_eq!(counts.company_news, 1);
        assert_eq!(counts.history, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_analyze_keys_everything_by_resolved_symbol() {
        let mock = MockMarketClient::new();
        let (service, _dir) = service(mock.clone());

        let analysis = service.analyze("tcs", 5).await.unwrap();
        assert_eq!(analysis.symbol, "TCS.NS");
        assert_eq!(analysis.news.unwrap().subject, "TCS.NS");
        assert_eq!(analysis.forecast.unwrap().symbol, "TCS.NS");
        assert_eq!(analysis.indicators.unwrap().symbol, "TCS.NS");

        // Later calls with the listed symbol reuse what analyze stored
        service.history("TCS.NS", "1y").await.unwrap();
        service.company_news("TCS.NS", 5).await.unwrap();
        let counts = mock.call_counts();
        assert_eq!(counts.history, 1);
        assert_eq!(counts.company_news, 1);
    }

    #[tokio::test]
    async fn test_indicators_share_the_history_entry() {
        let mock = MockMarketClient::new().with_bars(40);
        let (service, _dir) = service(mock.clone());

        let first = service.indicators("INFY.NS", "6mo").await.unwrap();
        assert_eq!(first.provenance, Provenance::Fresh);
        assert_eq!(first.value.dates.len(), 40);
        assert!(first.value.latest.price_vs_sma50.is_none());

        service.history("INFY.NS", "6mo").await.unwrap();
        let second = service.indicators("INFY.NS", "6mo").await.unwrap();
        assert_eq!(second.provenance, Provenance::Cached);
        assert_eq!(mock.call_counts().history, 1);
    }

    #[tokio::test]
    async fn test_indicators_need_bars() {
        let (service, _dir) = service(MockMarketClient::new().with_bars(0));
        let err = service.indicators("INFY.NS", "1y").await.unwrap_err();
        assert!(err.to_string().contains("Not enough price history"));
    }

    #[tokio::test]
    async fn test_analyze_degrades_when_forecast_fails() {
        let (service, _dir) = service(MockMarketClient::new().with_bars(20));

        let analysis = service.analyze("TCS.NS", 5).await.unwrap();
        assert!(analysis.forecast.is_none());
        assert_eq!(analysis.warnings.len(), 1);
        assert!(analysis.warnings[0].starts_with("forecast:"));
        assert!(analysis.warnings[0].contains("need 60 bars, got 20"));
        // Indicators still come from the short history
        let indicators = analysis.indicators.unwrap();
        assert!(indicators.latest.rsi.is_some());
        assert!(indicators.latest.price_vs_sma50.is_none());
    }

    #[tokio::test]
    async fn test_analyze_serves_stale_parts() {
        let mock = MockMarketClient::new();
        let dir = TempDir::new().unwrap();
        let policy = TtlPolicy::standard()
            .with_ttl(Category::Fundamentals, chrono::TimeDelta::zero())
            .with_ttl(Category::News, chrono::TimeDelta::zero());
        let storage = CacheStorage::open_at(dir.path(), policy).unwrap();
        let gate = GateConfig {
            horizon_days: 3,
            timeout: Some(Duration::from_secs(30)),
            ..GateConfig::default()
        };
        let coordinator = Arc::new(FetchCoordinator::new(storage));
        let service = StockService::new(mock.clone(), coordinator, gate);

        service.analyze("TCS.NS", 5).await.unwrap();
        mock.set_failing(true);

        let analysis = service.analyze("TCS.NS", 5).await.unwrap();
        assert!(analysis.outdated);
        assert!(analysis.news.is_some());
        // History is still fresh in the store, so the forecast survives too
        assert!(analysis.forecast.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_and_stats() {
        let (service, _dir) = service(MockMarketClient::new());
        service.fundamentals("TCS.NS").await.unwrap();
        service.indices().await.unwrap();

        assert_eq!(service.stats().unwrap().unwrap().total_entries, 2);
        let removed = service
            .invalidate(&InvalidateScope::Category(Category::Indices))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(service.stats().unwrap().unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_predict_is_not_stored() {
        let (service, _dir) = service(MockMarketClient::new());
        service.predict("INFY.NS").await.unwrap();

        let stats = service.stats().unwrap().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.by_category, vec![(Category::History, 1)]);
    }
}
