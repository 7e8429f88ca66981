//! Cache key construction
//!
//! Keys are plain strings, unique within a category. The category itself is
//! always part of an entry's identity, so the same key string may appear under
//! several categories without colliding.

/// Key used for whole-market resources (index quotes, market news)
pub const MARKET_KEY: &str = "market";

/// Canonical form of a ticker: trimmed and upper-cased.
///
/// `reliance.ns` and ` RELIANCE.NS ` share one cache row.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Key for a symbol's price history over a range (`RELIANCE.NS:1y`).
pub fn history_key(symbol: &str, range: &str) -> String {
    format!(
        "{}:{}",
        normalize_symbol(symbol),
        range.trim().to_ascii_lowercase()
    )
}

/// Key for company-specific news (`company:TCS.NS`).
pub fn company_news_key(symbol: &str) -> String {
    format!("company:{}", normalize_symbol(symbol))
}
