//! Per-source rate limiting for market data providers
//!
//! Limiting is reactive: a source is only throttled after it has answered
//! with HTTP 429 once. Until then requests go out unthrottled.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use tokio::sync::RwLock;

/// Remote data sources, each with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Yahoo Finance chart API
    Yahoo,
    /// NewsAPI; the free tier is tight, 30/min once throttled
    NewsApi,
}

impl DataSource {
    pub const ALL: [DataSource; 2] = [DataSource::Yahoo, DataSource::NewsApi];

    /// Requests per second allowed once throttling is active.
    pub fn rate_limit(&self) -> f64 {
        match self {
            DataSource::Yahoo => 2.0,
            DataSource::NewsApi => 0.5,
        }
    }
}

/// Rate limiter state for a single source.
pub struct SourceRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    source: DataSource,
}

impl SourceRateLimiter {
    pub fn new(source: DataSource) -> Self {
        let rate = source.rate_limit();

        // Sub-1 rates become per-minute quotas
        let quota = if rate >= 1.0 {
            Quota::per_second(NonZeroU32::new(rate as u32).unwrap_or(NonZeroU32::MIN))
        } else {
            let per_min = (rate * 60.0).round() as u32;
            Quota::per_minute(NonZeroU32::new(per_min).unwrap_or(NonZeroU32::MIN))
        };

        Self {
            limiter: RateLimiter::direct(quota),
            active: AtomicBool::new(false),
            source,
        }
    }

    pub fn activate(&self) {
        let was_active = self.active.swap(true, Ordering::SeqCst);
        if !was_active {
            debug!("Rate limiting activated for {:?}", self.source);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for permission if rate limiting is active.
    pub async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for rate limiter {:?}", self.source);
            self.limiter.until_ready().await;
        }
    }
}

/// Rate limiters for every data source.
pub struct RateLimiterSet {
    limiters: RwLock<HashMap<DataSource, SourceRateLimiter>>,
}

impl Default for RateLimiterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterSet {
    pub fn new() -> Self {
        let limiters = DataSource::ALL
            .into_iter()
            .map(|source| (source, SourceRateLimiter::new(source)))
            .collect();

        Self {
            limiters: RwLock::new(limiters),
        }
    }

    pub async fn wait_for(&self, source: DataSource) {
        let limiters = self.limiters.read().await;
        if let Some(limiter) = limiters.get(&source) {
            limiter.wait_if_active().await;
        }
    }

    /// Start throttling `source` (called on 429).
    pub async fn activate(&self, source: DataSource) {
        let limiters = self.limiters.read().await;
        if let Some(limiter) = limiters.get(&source) {
            limiter.activate();
        }
    }

    pub async fn is_active(&self, source: DataSource) -> bool {
        let limiters = self.limiters.read().await;
        limiters.get(&source).is_some_and(|l| l.is_active())
    }
}
