//! Cached wrapper for market data sources
//!
//! Every call goes through the [`FetchCoordinator`], so repeated and
//! concurrent requests for the same resource hit the source at most once per
//! TTL window.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{Fundamentals, IndexQuote, MarketDataApi, NewsArticle, PriceHistory, is_valid_range};
use crate::cache::{
    Cached, Category, FetchCoordinator, Fetched, MARKET_KEY, company_news_key, history_key,
    normalize_symbol,
};
use crate::error::{FetchError, Result};

/// A cacheable market data resource, identified by `(category, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Fundamentals { symbol: String },
    History { symbol: String, range: String },
    CompanyNews { symbol: String },
    MarketNews,
    Indices,
}

impl Resource {
    /// Resolve a consumer-supplied key within `category`.
    ///
    /// Symbols are normalized, so `tcs.ns` and `TCS.NS` name the same entry.
    pub fn parse(category: Category, key: &str) -> std::result::Result<Self, FetchError> {
        let key = key.trim();
        let malformed = |expected: &str| FetchError::NotFound {
            category,
            key: key.to_string(),
            reason: format!("malformed key, expected {}", expected),
        };

        match category {
            Category::Fundamentals if !key.is_empty() && !key.contains(':') => {
                Ok(Resource::Fundamentals {
                    symbol: normalize_symbol(key),
                })
            }
            Category::Fundamentals => Err(malformed("SYMBOL")),
            Category::History => match key.split_once(':') {
                Some((symbol, range)) if !symbol.trim().is_empty() && is_valid_range(range) => {
                    Ok(Resource::History {
                        symbol: normalize_symbol(symbol),
                        range: range.trim().to_ascii_lowercase(),
                    })
                }
                _ => Err(malformed("SYMBOL:RANGE")),
            },
            Category::News if key.eq_ignore_ascii_case(MARKET_KEY) => Ok(Resource::MarketNews),
            Category::News => match key.split_once(':') {
                Some((prefix, symbol))
                    if prefix.eq_ignore_ascii_case("company") && !symbol.trim().is_empty() =>
                {
                    Ok(Resource::CompanyNews {
                        symbol: normalize_symbol(symbol),
                    })
                }
                _ => Err(malformed("'market' or company:SYMBOL")),
            },
            Category::Indices if key.eq_ignore_ascii_case(MARKET_KEY) => Ok(Resource::Indices),
            Category::Indices => Err(malformed("'market'")),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Resource::Fundamentals { .. } => Category::Fundamentals,
            Resource::History { .. } => Category::History,
            Resource::CompanyNews { .. } | Resource::MarketNews => Category::News,
            Resource::Indices => Category::Indices,
        }
    }

    /// Canonical cache key
    pub fn key(&self) -> String {
        match self {
            Resource::Fundamentals { symbol } => normalize_symbol(symbol),
            Resource::History { symbol, range } => history_key(symbol, range),
            Resource::CompanyNews { symbol } => company_news_key(symbol),
            Resource::MarketNews | Resource::Indices => MARKET_KEY.to_string(),
        }
    }
}

/// Market data source fronted by the fetch coordinator.
pub struct CachedMarketData<C: MarketDataApi + 'static> {
    inner: Arc<C>,
    coordinator: Arc<FetchCoordinator>,
}

impl<C: MarketDataApi + 'static> CachedMarketData<C> {
    pub fn new(inner: C, coordinator: Arc<FetchCoordinator>) -> Self {
        Self {
            inner: Arc::new(inner),
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    /// Raw payload for `resource`, as stored
    pub async fn fetch(&self, resource: &Resource) -> std::result::Result<Fetched, FetchError> {
        let inner = Arc::clone(&self.inner);
        let owned = resource.clone();
        self.coordinator
            .get_or_produce(resource.category(), &resource.key(), move || {
                produce(inner, owned)
            })
            .await
    }

    /// Raw payload for a `(category, key)` pair
    pub async fn fetch_raw(
        &self,
        category: Category,
        key: &str,
    ) -> std::result::Result<Fetched, FetchError> {
        let resource = Resource::parse(category, key)?;
        self.fetch(&resource).await
    }

    pub async fn fundamentals(&self, symbol: &str) -> Result<Cached<Fundamentals>> {
        let key = normalize_symbol(symbol);
        let symbol = key.clone();
        let inner = Arc::clone(&self.inner);
        self.coordinator
            .fetch_json(Category::Fundamentals, &key, move || async move {
                inner.fundamentals(&symbol).await
            })
            .await
    }

    pub async fn history(&self, symbol: &str, range: &str) -> Result<Cached<PriceHistory>> {
        let key = history_key(symbol, range);
        let symbol = normalize_symbol(symbol);
        let range = range.trim().to_ascii_lowercase();
        let inner = Arc::clone(&self.inner);
        self.coordinator
            .fetch_json(Category::History, &key, move || async move {
                inner.history(&symbol, &range).await
            })
            .await
    }

    pub async fn company_news(&self, symbol: &str) -> Result<Cached<Vec<NewsArticle>>> {
        self.decode(&Resource::CompanyNews {
            symbol: normalize_symbol(symbol),
        })
        .await
    }

    pub async fn market_news(&self) -> Result<Cached<Vec<NewsArticle>>> {
        self.decode(&Resource::MarketNews).await
    }

    pub async fn indices(&self) -> Result<Cached<Vec<IndexQuote>>> {
        self.decode(&Resource::Indices).await
    }

    async fn decode<T: DeserializeOwned>(&self, resource: &Resource) -> Result<Cached<T>> {
        let fetched = self.fetch(resource).await?;
        Ok(Cached {
            value: serde_json::from_slice(&fetched.payload)?,
            provenance: fetched.provenance,
            stored_at: fetched.stored_at,
        })
    }
}

/// Producer for `resource`: one call to the source, encoded as JSON.
async fn produce<C: MarketDataApi>(inner: Arc<C>, resource: Resource) -> Result<Vec<u8>> {
    let payload = match resource {
        Resource::Fundamentals { symbol } => serde_json::to_vec(&inner.fundamentals(&symbol).await?)?,
        Resource::History { symbol, range } => {
            serde_json::to_vec(&inner.history(&symbol, &range).await?)?
        }
        Resource::CompanyNews { symbol } => serde_json::to_vec(&inner.company_news(&symbol).await?)?,
        Resource::MarketNews => serde_json::to_vec(&inner.market_news().await?)?,
        Resource::Indices => serde_json::to_vec(&inner.indices().await?)?,
    };
    Ok(payload)
}
