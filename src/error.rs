//! Error types for stockcast

use std::time::Duration;
use thiserror::Error;

use crate::cache::Category;

/// Result type alias for stockcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

/// Transport-level errors raised by market data producers.
///
/// These never escape the fetch coordinator; callers above it see
/// [`FetchError`] instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Request rejected by upstream: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to upstream".to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Persistent store errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not determine cache directory")]
    NoHome,

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unknown cache scope '{0}'. Expected a category, 'expired' or 'all'")]
    UnknownScope(String),
}

/// Outcome of a failed coordinated fetch.
///
/// Cloneable because one failure is handed to every caller waiting on the
/// same in-flight slot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("No {category} data available for '{key}': {reason}")]
    NotFound {
        category: Category,
        key: String,
        reason: String,
    },

    #[error("Producer failed: {0}")]
    Producer(String),

    #[error("Producer timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("NewsAPI key not configured. Run `stockcast init --news-api-key <KEY>` or set NEWS_API_KEY.")]
    MissingApiKey,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Forecast model errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Not enough price history: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Training failed: {0}")]
    Training(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_not_found() {
        let err = ApiError::NotFound("RELIANCE.NS".to_string());
        assert!(err.to_string().contains("RELIANCE.NS"));
    }

    #[test]
    fn test_api_error_rate_limit() {
        let err = ApiError::RateLimit(Duration::from_secs(30));
        let msg = err.to_string();
        assert!(msg.contains("Rate limit"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_api_error_network() {
        let err = ApiError::Network("Connection refused".to_string());
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_fetch_error_not_found_names_category_and_key() {
        let err = FetchError::NotFound {
            category: Category::News,
            key: "company:TCS.NS".to_string(),
            reason: "upstream down".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("news"));
        assert!(msg.contains("company:TCS.NS"));
        assert!(msg.contains("upstream down"));
    }

    #[test]
    fn test_fetch_error_is_cloneable_and_comparable() {
        let err = FetchError::Timeout(Duration::from_millis(250));
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_cache_error_unknown_scope() {
        let err = CacheError::UnknownScope("prediction".to_string());
        assert!(err.to_string().contains("prediction"));
    }

    #[test]
    fn test_config_error_missing_api_key() {
        let err = ConfigError::MissingApiKey;
        assert!(err.to_string().contains("stockcast init"));
    }

    #[test]
    fn test_model_error_insufficient_data() {
        let err = ModelError::InsufficientData { needed: 60, got: 12 };
        let msg = err.to_string();
        assert!(msg.contains("60"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_error_from_fetch_error() {
        let err: Error = FetchError::Producer("boom".to_string()).into();

        match err {
            Error::Fetch(FetchError::Producer(msg)) => assert_eq!(msg, "boom"),
            _ => panic!("Expected Error::Fetch(FetchError::Producer)"),
        }
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_str = "invalid: [yaml: content";
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let config_err: ConfigError = yaml_err.into();

        match config_err {
            ConfigError::ParseError(_) => (),
            _ => panic!("Expected ConfigError::ParseError"),
        }
    }
}
