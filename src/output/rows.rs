//! Display models for table output
//!
//! Each row type turns a domain value into CLI-friendly columns.

use serde::Serialize;
use tabled::Tabled;

use crate::cache::Category;
use crate::forecast::ForecastPoint;
use crate::market::{IndexQuote, PriceBar};
use crate::sentiment::ScoredArticle;

const TITLE_WIDTH: usize = 72;

/// Label/value pair for summary tables
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct MetricDisplay {
    #[tabled(rename = "METRIC")]
    pub metric: String,

    #[tabled(rename = "VALUE")]
    pub value: String,
}

impl MetricDisplay {
    pub fn new(metric: &str, value: impl Into<String>) -> Self {
        Self {
            metric: metric.to_string(),
            value: value.into(),
        }
    }

    /// Row for an optional price, `N/A` when missing
    pub fn price(metric: &str, value: Option<f64>) -> Self {
        Self::new(metric, value.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v)))
    }
}

/// One daily bar
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct BarDisplay {
    #[tabled(rename = "DATE")]
    pub date: String,

    #[tabled(rename = "OPEN")]
    pub open: String,

    #[tabled(rename = "HIGH")]
    pub high: String,

    #[tabled(rename = "LOW")]
    pub low: String,

    #[tabled(rename = "CLOSE")]
    pub close: String,

    #[tabled(rename = "VOLUME")]
    pub volume: u64,
}

impl From<&PriceBar> for BarDisplay {
    fn from(bar: &PriceBar) -> Self {
        Self {
            date: bar.date.to_string(),
            open: format!("{:.2}", bar.open),
            high: format!("{:.2}", bar.high),
            low: format!("{:.2}", bar.low),
            close: format!("{:.2}", bar.close),
            volume: bar.volume,
        }
    }
}

/// One scored article
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ArticleDisplay {
    #[tabled(rename = "PUBLISHED")]
    pub published: String,

    #[tabled(rename = "SENTIMENT")]
    pub sentiment: String,

    #[tabled(rename = "SCORE")]
    pub score: String,

    #[tabled(rename = "SOURCE")]
    pub source: String,

    #[tabled(rename = "TITLE")]
    pub title: String,
}

impl From<&ScoredArticle> for ArticleDisplay {
    fn from(scored: &ScoredArticle) -> Self {
        Self {
            published: scored
                .article
                .published_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            sentiment: scored.sentiment.label.to_string(),
            score: format!("{:+.3}", scored.sentiment.compound),
            source: scored.article.source.clone(),
            title: truncate(&scored.article.title, TITLE_WIDTH),
        }
    }
}

/// One market index
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct IndexDisplay {
    #[tabled(rename = "INDEX")]
    pub name: String,

    #[tabled(rename = "VALUE")]
    pub value: String,

    #[tabled(rename = "CHANGE")]
    pub change: String,

    #[tabled(rename = "CHANGE %")]
    pub change_percent: String,
}

impl From<&IndexQuote> for IndexDisplay {
    fn from(quote: &IndexQuote) -> Self {
        Self {
            name: quote.name.clone(),
            value: format!("{:.2}", quote.value),
            change: format!("{:+.2}", quote.change),
            change_percent: format!("{:+.2}%", quote.change_percent),
        }
    }
}

/// One projected day
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ForecastDisplay {
    #[tabled(rename = "DAY")]
    pub day: usize,

    #[tabled(rename = "DATE")]
    pub date: String,

    #[tabled(rename = "PRICE")]
    pub price: String,

    #[tabled(rename = "LOW (95%)")]
    pub lower: String,

    #[tabled(rename = "HIGH (95%)")]
    pub upper: String,
}

impl From<&ForecastPoint> for ForecastDisplay {
    fn from(point: &ForecastPoint) -> Self {
        Self {
            day: point.day,
            date: point.date.to_string(),
            price: format!("{:.2}", point.price),
            lower: format!("{:.2}", point.lower),
            upper: format!("{:.2}", point.upper),
        }
    }
}

/// Valid entries of one cache category
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct CategoryDisplay {
    #[tabled(rename = "CATEGORY")]
    pub category: String,

    #[tabled(rename = "VALID ENTRIES")]
    pub entries: usize,
}

impl From<&(Category, usize)> for CategoryDisplay {
    fn from((category, entries): &(Category, usize)) -> Self {
        Self {
            category: category.to_string(),
            entries: *entries,
        }
    }
}

/// Cut `text` to `width` characters, marking the cut with an ellipsis
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_bar_display() {
        let bar = PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            open: 100.0,
            high: 110.456,
            low: 99.0,
            close: 105.5,
            volume: 12_000,
        };
        let row = BarDisplay::from(&bar);
        assert_eq!(row.date, "2024-03-01");
        assert_eq!(row.high, "110.46");
        assert_eq!(row.close, "105.50");
        assert_eq!(row.volume, 12_000);
    }

    #[test]
    fn test_index_display_signs() {
        let quote = IndexQuote {
            symbol: "^BSESN".to_string(),
            name: "SENSEX".to_string(),
            value: 72800.0,
            previous_close: 72900.0,
            change: -100.0,
            change_percent: -0.137,
        };
        let row = IndexDisplay::from(&quote);
        assert_eq!(row.change, "-100.00");
        assert_eq!(row.change_percent, "-0.14%");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("this is too long", 8), "this is…");
    }

    #[test]
    fn test_metric_price_missing() {
        assert_eq!(MetricDisplay::price("Open", None).value, "N/A");
        assert_eq!(MetricDisplay::price("Open", Some(1.234)).value, "1.23");
    }
}
