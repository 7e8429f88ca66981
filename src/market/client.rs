//! HTTP client for Yahoo Finance and NewsAPI

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use log::{debug, info, warn};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::rate_limit::{DataSource, RateLimiterSet};
use super::{
    Fundamentals, IndexQuote, MarketDataApi, NewsArticle, PriceBar, PriceHistory, is_valid_range,
    percent_change,
};
use crate::cache::normalize_symbol;
use crate::error::{ApiError, ConfigError, Error, Result};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
const NEWS_BASE_URL: &str = "https://newsapi.org";

/// Override the Yahoo Finance host (tests, proxies)
pub const YAHOO_HOST_ENV: &str = "STOCKCAST_YAHOO_HOST";
/// Override the NewsAPI host
pub const NEWS_HOST_ENV: &str = "STOCKCAST_NEWS_HOST";

// Yahoo rejects requests without a browser-like agent
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const NEWS_DOMAINS: &str = "moneycontrol.com,economictimes.indiatimes.com,livemint.com,business-standard.com,financialexpress.com,ndtv.com";
const MARKET_NEWS_QUERY: &str = "(stock market OR NIFTY OR SENSEX) AND India";
const MARKET_NEWS_DAYS: i64 = 7;
const MARKET_NEWS_PAGE_SIZE: u32 = 30;
const COMPANY_NEWS_DAYS: i64 = 30;
const COMPANY_NEWS_PAGE_SIZE: u32 = 20;

/// Headline indices: (symbol, display name)
const INDICES: [(&str, &str); 2] = [("^NSEI", "NIFTY 50"), ("^BSESN", "SENSEX")];

/// Market data client for Yahoo Finance (prices) and NewsAPI (articles)
pub struct MarketClient {
    http: HttpClient,
    yahoo_base: String,
    news_base: String,
    news_api_key: Option<String>,
    rate_limiters: Arc<RateLimiterSet>,
}

impl MarketClient {
    /// Create a client; hosts may be overridden through the environment.
    pub fn new(news_api_key: Option<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let yahoo_base = std::env::var(YAHOO_HOST_ENV).unwrap_or_else(|_| YAHOO_BASE_URL.into());
        let news_base = std::env::var(NEWS_HOST_ENV).unwrap_or_else(|_| NEWS_BASE_URL.into());

        Ok(Self {
            http,
            yahoo_base: yahoo_base.trim_end_matches('/').to_string(),
            news_base: news_base.trim_end_matches('/').to_string(),
            news_api_key: news_api_key.filter(|k| !k.trim().is_empty()),
            rate_limiters: Arc::new(RateLimiterSet::new()),
        })
    }

    /// Point the client at other hosts
    pub fn with_base_urls(mut self, yahoo: &str, news: &str) -> Self {
        self.yahoo_base = yahoo.trim_end_matches('/').to_string();
        self.news_base = news.trim_end_matches('/').to_string();
        self
    }

    pub fn has_news_api_key(&self) -> bool {
        self.news_api_key.is_some()
    }

    /// Send a request and decode the JSON body, mapping HTTP failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        source: DataSource,
        request: RequestBuilder,
    ) -> Result<T> {
        self.rate_limiters.wait_for(source).await;

        let response = request.send().await.map_err(ApiError::from)?;

        let status = response.status();
        debug!("{:?} responded {}", source, status);
        match status {
            StatusCode::OK => {
                let data = response.json::<T>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(data)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::Unauthorized(describe_error(&body, "Request not authorized")).into())
            }
            StatusCode::NOT_FOUND => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::NotFound(describe_error(&body, "Resource not found")).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.rate_limiters.activate(source).await;
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::BadRequest(describe_error(&body, "Bad request")).into())
            }
            status if status.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                let fallback = format!("Server error: {}", status);
                Err(ApiError::ServerError(describe_error(&body, &fallback)).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }

    /// Fetch the daily chart for `symbol` over `range`.
    async fn chart(&self, symbol: &str, range: &str) -> Result<ChartResult> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.yahoo_base,
            symbol.replace('^', "%5E")
        );
        let request = self
            .http
            .get(&url)
            .query(&[("range", range), ("interval", "1d")]);

        let envelope: ChartEnvelope = self.get_json(DataSource::Yahoo, request).await?;

        if let Some(err) = envelope.chart.error {
            return Err(ApiError::NotFound(format!("{}: {}", symbol, err.description)).into());
        }
        envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ApiError::NotFound(format!("No chart data for {}", symbol)).into())
    }

    /// Chart for `symbol`, retrying a bare ticker on NSE when Yahoo does
    /// not know it. Returns the symbol that answered.
    async fn resolved_chart(&self, symbol: &str, range: &str) -> Result<(String, ChartResult)> {
        match self.chart(symbol, range).await {
            Ok(chart) => Ok((symbol.to_string(), chart)),
            Err(Error::Api(ApiError::NotFound(_))) if needs_exchange_suffix(symbol) => {
                let retry = format!("{}.NS", symbol);
                info!("No data for {}, retrying as {}", symbol, retry);
                let chart = self.chart(&retry, range).await?;
                Ok((retry, chart))
            }
            Err(e) => Err(e),
        }
    }

    async fn everything(&self, query: &str, days: i64, page_size: u32) -> Result<Vec<NewsArticle>> {
        let api_key = self
            .news_api_key
            .as_deref()
            .ok_or(Error::Config(ConfigError::MissingApiKey))?;

        let from = (Utc::now() - TimeDelta::days(days))
            .format("%Y-%m-%d")
            .to_string();
        let page_size = page_size.to_string();
        let request = self
            .http
            .get(format!("{}/v2/everything", self.news_base))
            .header("X-Api-Key", api_key)
            .query(&[
                ("q", query),
                ("domains", NEWS_DOMAINS),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("from", from.as_str()),
                ("pageSize", page_size.as_str()),
            ]);

        let response: NewsResponse = self.get_json(DataSource::NewsApi, request).await?;
        if response.status.as_deref() == Some("error") {
            let msg = response.message.unwrap_or_else(|| "NewsAPI error".to_string());
            return Err(ApiError::BadRequest(msg).into());
        }

        Ok(response
            .articles
            .into_iter()
            .filter_map(RawArticle::into_article)
            .collect())
    }

    async fn index_quote(&self, symbol: &str, name: &str) -> Result<IndexQuote> {
        let chart = self.chart(symbol, "5d").await?;
        let bars = chart.bars();
        let value = chart
            .meta
            .regular_market_price
            .or_else(|| bars.last().map(|b| b.close))
            .ok_or_else(|| ApiError::NotFound(format!("No quote for {}", symbol)))?;
        let previous_close = previous_close(&bars, value);
        let change = value - previous_close;

        Ok(IndexQuote {
            symbol: symbol.to_string(),
            name: name.to_string(),
            value: round2(value),
            previous_close: round2(previous_close),
            change: round2(change),
            change_percent: round2(percent_change(value, previous_close)),
        })
    }
}

#[async_trait]
impl MarketDataApi for MarketClient {
    async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let symbol = normalize_symbol(symbol);
        info!("Fetching fundamentals for {}", symbol);

        let (symbol, chart) = self.resolved_chart(&symbol, "1y").await?;
        build_fundamentals(&symbol, chart)
    }

    async fn history(&self, symbol: &str, range: &str) -> Result<PriceHistory> {
        let symbol = normalize_symbol(symbol);
        let range = range.trim().to_ascii_lowercase();
        if !is_valid_range(&range) {
            return Err(ApiError::BadRequest(format!("Unsupported history range '{}'", range)).into());
        }
        info!("Fetching {} history for {}", range, symbol);

        let (symbol, chart) = self.resolved_chart(&symbol, &range).await?;
        let bars = chart.bars();
        if bars.is_empty() {
            return Err(ApiError::NotFound(format!("Empty history for {}", symbol)).into());
        }

        Ok(PriceHistory {
            symbol,
            range,
            bars,
        })
    }

    async fn company_news(&self, symbol: &str) -> Result<Vec<NewsArticle>> {
        let name = company_name(&normalize_symbol(symbol));
        info!("Fetching company news for {}", name);
        let query = format!("\"{}\" AND (India OR stock OR share)", name);
        self.everything(&query, COMPANY_NEWS_DAYS, COMPANY_NEWS_PAGE_SIZE)
            .await
    }

    async fn market_news(&self) -> Result<Vec<NewsArticle>> {
        info!("Fetching market news");
        self.everything(MARKET_NEWS_QUERY, MARKET_NEWS_DAYS, MARKET_NEWS_PAGE_SIZE)
            .await
    }

    async fn indices(&self) -> Result<Vec<IndexQuote>> {
        let quotes = futures::future::join_all(
            INDICES
                .iter()
                .map(|(symbol, name)| self.index_quote(symbol, name)),
        )
        .await;

        let mut fetched = Vec::new();
        let mut last_error = None;
        for (quote, (symbol, _)) in quotes.into_iter().zip(INDICES) {
            match quote {
                Ok(q) => fetched.push(q),
                Err(e) => {
                    warn!("Failed to fetch index {}: {}", symbol, e);
                    last_error = Some(e);
                }
            }
        }

        match (fetched.is_empty(), last_error) {
            (true, Some(err)) => Err(err),
            _ => Ok(fetched),
        }
    }
}

/// Build fundamentals from chart metadata and one year of daily bars.
fn build_fundamentals(symbol: &str, chart: ChartResult) -> Result<Fundamentals> {
    let bars = chart.bars();
    let meta = chart.meta;

    let price = meta
        .regular_market_price
        .or_else(|| bars.last().map(|b| b.close))
        .ok_or_else(|| ApiError::NotFound(format!("No price data for {}", symbol)))?;
    let previous_close = previous_close(&bars, price);
    let last = bars.last();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let fifty_two_week_high = meta
        .fifty_two_week_high
        .or_else(|| bars.iter().map(|b| b.high).reduce(f64::max));
    let fifty_two_week_low = meta
        .fifty_two_week_low
        .or_else(|| bars.iter().map(|b| b.low).reduce(f64::min));

    let name = meta
        .long_name
        .or(meta.short_name)
        .unwrap_or_else(|| company_name(symbol));

    Ok(Fundamentals {
        symbol: symbol.to_string(),
        name,
        exchange: meta.exchange_name,
        currency: meta.currency,
        price: round2(price),
        previous_close: round2(previous_close),
        change: round2(price - previous_close),
        change_percent: round2(percent_change(price, previous_close)),
        open: last.map(|b| round2(b.open)),
        day_high: meta
            .regular_market_day_high
            .or_else(|| last.map(|b| b.high))
            .map(round2),
        day_low: meta
            .regular_market_day_low
            .or_else(|| last.map(|b| b.low))
            .map(round2),
        volume: meta
            .regular_market_volume
            .map(|v| v as u64)
            .or_else(|| last.map(|b| b.volume))
            .unwrap_or(0),
        fifty_two_week_high: fifty_two_week_high.map(round2),
        fifty_two_week_low: fifty_two_week_low.map(round2),
        fifty_day_avg: trailing_mean(&closes, 50).map(round2),
        two_hundred_day_avg: trailing_mean(&closes, 200).map(round2),
    })
}

/// Close of the bar before the latest, or `current` when there is none
fn previous_close(bars: &[PriceBar], current: f64) -> f64 {
    match bars.len() {
        n if n >= 2 => bars[n - 2].close,
        _ => current,
    }
}

fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Bare tickers without an exchange suffix are tried on NSE.
pub(crate) fn needs_exchange_suffix(symbol: &str) -> bool {
    !symbol.contains('.') && !symbol.starts_with('^')
}

/// Company name used in news queries: the ticker without its exchange suffix
fn company_name(symbol: &str) -> String {
    symbol
        .trim_end_matches(".NS")
        .trim_end_matches(".BO")
        .to_string()
}

/// Pull a readable message out of an error body
fn describe_error(body: &str, fallback: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return if body.trim().is_empty() {
            fallback.to_string()
        } else {
            body.trim().to_string()
        };
    };

    value
        .pointer("/chart/error/description")
        .or_else(|| value.pointer("/message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChartErrorBody {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    exchange_name: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartResult {
    /// Complete bars only; rows with a missing price are dropped.
    fn bars(&self) -> Vec<PriceBar> {
        let Some(quote) = self.indicators.quote.first() else {
            return Vec::new();
        };
        let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let date = market_date(*ts, self.meta.gmtoffset)?;
                Some(PriceBar {
                    date,
                    open: at(&quote.open, i)?,
                    high: at(&quote.high, i)?,
                    low: at(&quote.low, i)?,
                    close: at(&quote.close, i)?,
                    volume: at(&quote.volume, i).unwrap_or(0.0) as u64,
                })
            })
            .collect()
    }
}

/// Trading date of a bar in the exchange's local time
fn market_date(timestamp: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmtoffset, 0).map(|t| t.date_naive())
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    source: Option<RawSource>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl RawArticle {
    fn into_article(self) -> Option<NewsArticle> {
        let title = self.title.filter(|t| !t.trim().is_empty() && t != "[Removed]")?;
        Some(NewsArticle {
            title,
            description: self.description.filter(|d| !d.trim().is_empty()),
            url: self.url.unwrap_or_default(),
            source: self
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            published_at: self
                .published_at
                .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
                .map(|p| p.with_timezone(&Utc)),
        })
    }
}
