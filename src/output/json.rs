//! JSON output formatting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{Cached, Provenance};

/// Wrapper for JSON output with metadata
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    /// The actual data
    pub data: T,

    /// Metadata about the response
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    /// Timestamp of the response
    pub timestamp: String,

    /// CLI version
    pub version: String,

    /// Where the data came from, for cached resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// When the served entry was stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

impl<T> JsonOutput<T> {
    /// Create a new JSON output with metadata
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                source: None,
                stored_at: None,
            },
        }
    }

    /// Record cache provenance in the metadata
    pub fn with_provenance(
        mut self,
        provenance: Provenance,
        stored_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.meta.source = Some(provenance.to_string());
        self.meta.stored_at = stored_at;
        self
    }
}

/// Format data as pretty-printed JSON
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data))
}

/// Format a cached value with its provenance lifted into the metadata
pub fn format_cached<T: Serialize>(cached: &Cached<T>) -> Result<String, serde_json::Error> {
    let output =
        JsonOutput::new(&cached.value).with_provenance(cached.provenance, cached.stored_at);
    serde_json::to_string_pretty(&output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Clone)]
    struct TestItem {
        symbol: String,
        price: f64,
    }

    #[test]
    fn test_json_output_new() {
        let output = JsonOutput::new(vec!["TCS.NS", "INFY.NS"]);

        assert_eq!(output.data, vec!["TCS.NS", "INFY.NS"]);
        assert_eq!(output.meta.version, env!("CARGO_PKG_VERSION"));
        assert!(!output.meta.timestamp.is_empty());
        assert!(output.meta.source.is_none());
    }

    #[test]
    fn test_format_json_omits_cache_metadata() {
        let items = vec![TestItem {
            symbol: "TCS.NS".to_string(),
            price: 3500.5,
        }];

        let result = format_json(&items).unwrap();

        assert!(result.contains("\"data\""));
        assert!(result.contains("\"symbol\": \"TCS.NS\""));
        assert!(result.contains("\"timestamp\""));
        assert!(!result.contains("\"source\""));
        assert!(!result.contains("\"stored_at\""));
    }

    #[test]
    fn test_format_cached_lifts_provenance() {
        let cached = Cached {
            value: TestItem {
                symbol: "INFY.NS".to_string(),
                price: 1500.0,
            },
            provenance: Provenance::Stale,
            stored_at: Some(Utc::now()),
        };

        let result = format_cached(&cached).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(parsed["data"]["symbol"], "INFY.NS");
        assert_eq!(parsed["meta"]["source"], "stale");
        assert!(parsed["meta"]["stored_at"].is_string());
        // The value itself is not wrapped
        assert!(parsed["data"].get("provenance").is_none());
    }

    #[test]
    fn test_format_json_empty_vec() {
        let items: Vec<TestItem> = vec![];
        let result = format_json(&items).unwrap();

        assert!(result.contains("\"data\": []"));
    }
}
