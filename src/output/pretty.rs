//! Human-readable rendering for `--format pretty`

use chrono::{DateTime, Local, Utc};
use colored::Colorize;

use super::rows::{
    ArticleDisplay, BarDisplay, CategoryDisplay, ForecastDisplay, IndexDisplay, MetricDisplay,
};
use super::table::format_table;
use crate::cache::{CacheStats, Cached, Provenance};
use crate::forecast::{Forecast, Trend};
use crate::indicators::TechnicalIndicators;
use crate::market::{Fundamentals, PriceHistory};
use crate::sentiment::SentimentLabel;
use crate::service::{Analysis, MarketSummary, NewsReport};

/// One-line note on where a value came from
pub fn provenance_line(provenance: Provenance, stored_at: Option<DateTime<Utc>>) -> String {
    let when = stored_at
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    match provenance {
        Provenance::Fresh => format!("{} live data", "●".green()),
        Provenance::Cached => format!("{} cached at {}", "●".cyan(), when),
        Provenance::Stale => format!(
            "{} {}",
            "⚠".yellow(),
            format!("source unavailable, showing data stored at {}", when).yellow()
        ),
    }
}

/// Signed change, green when up and red when down
pub fn change(value: f64, percent: f64) -> String {
    let text = format!("{:+.2} ({:+.2}%)", value, percent);
    if value < 0.0 {
        text.red().to_string()
    } else {
        text.green().to_string()
    }
}

fn trend(trend: Trend) -> String {
    match trend {
        Trend::Upward => "▲ upward".green().to_string(),
        Trend::Downward => "▼ downward".red().to_string(),
    }
}

fn label(label: SentimentLabel) -> String {
    match label {
        SentimentLabel::Positive => "positive".green().to_string(),
        SentimentLabel::Negative => "negative".red().to_string(),
        SentimentLabel::Neutral => "neutral".dimmed().to_string(),
    }
}

pub fn fundamentals(cached: &Cached<Fundamentals>) -> String {
    let mut lines = fundamentals_lines(&cached.value);
    lines.push(provenance_line(cached.provenance, cached.stored_at));
    lines.join("\n")
}

fn fundamentals_lines(f: &Fundamentals) -> Vec<String> {
    let mut lines = vec![
        format!("{} ({})", f.name.bold(), f.symbol),
        format!(
            "{} {}  {}",
            format!("{:.2}", f.price).bold(),
            f.currency.as_deref().unwrap_or(""),
            change(f.change, f.change_percent)
        ),
        String::new(),
    ];

    let rows = vec![
        MetricDisplay::price("Previous close", Some(f.previous_close)),
        MetricDisplay::price("Open", f.open),
        MetricDisplay::price("Day high", f.day_high),
        MetricDisplay::price("Day low", f.day_low),
        MetricDisplay::new("Volume", f.volume.to_string()),
        MetricDisplay::price("52-week high", f.fifty_two_week_high),
        MetricDisplay::price("52-week low", f.fifty_two_week_low),
        MetricDisplay::price("50-day average", f.fifty_day_avg),
        MetricDisplay::price("200-day average", f.two_hundred_day_avg),
        MetricDisplay::new(
            "Exchange",
            f.exchange.clone().unwrap_or_else(|| "N/A".to_string()),
        ),
    ];
    lines.push(format_table(&rows, ""));
    lines
}

pub fn history(cached: &Cached<PriceHistory>) -> String {
    let h = &cached.value;
    let rows: Vec<BarDisplay> = h.bars.iter().map(BarDisplay::from).collect();

    let mut lines = vec![format!(
        "{} daily bars for {} ({})",
        h.bars.len(),
        h.symbol.bold(),
        h.range
    )];
    lines.push(format_table(&rows, "No price history found."));
    lines.push(provenance_line(cached.provenance, cached.stored_at));
    lines.join("\n")
}

pub fn news(report: &NewsReport) -> String {
    let s = &report.summary;
    let rows: Vec<ArticleDisplay> = report.articles.iter().map(ArticleDisplay::from).collect();
    vec![
        format!(
            "News sentiment for {}: {} (score {:+.3}, confidence {:.1}%)",
            report.subject.bold(),
            label(s.label),
            s.score,
            s.confidence
        ),
        format!(
            "{} positive, {} negative, {} neutral",
            s.positive_count, s.negative_count, s.neutral_count
        ),
        format_table(&rows, "No articles found."),
        provenance_line(report.provenance, report.stored_at),
    ]
    .join("\n")
}

pub fn forecast(f: &Forecast) -> String {
    let rows: Vec<ForecastDisplay> = f.points.iter().map(ForecastDisplay::from).collect();
    let change_text = format!("{:+.2}%", f.change_percent);
    vec![
        format!(
            "{}-day forecast for {} from {:.2} ({})",
            f.horizon_days,
            f.symbol.bold(),
            f.last_price,
            f.last_date
        ),
        format!(
            "Trend: {}  Expected change: {}",
            trend(f.trend),
            if f.change_percent < 0.0 {
                change_text.red()
            } else {
                change_text.green()
            }
        ),
        format_table(&rows, "No forecast points."),
        format!(
            "Backtest on {} held-out days: MAPE {:.2}%, R² {:.3} (trained on {})",
            f.backtest.test_size, f.backtest.mape, f.backtest.r2, f.backtest.train_size
        )
        .dimmed()
        .to_string(),
    ]
    .join("\n")
}

pub fn market(summary: &MarketSummary) -> String {
    let rows: Vec<IndexDisplay> = summary.indices.iter().map(IndexDisplay::from).collect();
    let mut lines = vec![
        "Market overview".bold().to_string(),
        format_table(&rows, "No index data."),
    ];
    if let Some(report) = &summary.news {
        lines.push(String::new());
        lines.push(news(report));
    }
    lines.extend(warnings(&summary.warnings, summary.outdated));
    lines.join("\n")
}

/// Latest indicator readings with a short interpretation of RSI and %K
pub fn indicators(ind: &TechnicalIndicators) -> String {
    let l = &ind.latest;
    let percent = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{:+.2}%", v));
    let level = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{:.1}", v));

    let rows = vec![
        MetricDisplay::new("RSI (14)", level(l.rsi)),
        MetricDisplay::price("MACD", l.macd),
        MetricDisplay::price("MACD signal", l.macd_signal),
        MetricDisplay::new("Price vs SMA 20", percent(l.price_vs_sma20)),
        MetricDisplay::new("Price vs SMA 50", percent(l.price_vs_sma50)),
        MetricDisplay::new("Price vs SMA 200", percent(l.price_vs_sma200)),
        MetricDisplay::price("Bollinger upper", l.bollinger_upper),
        MetricDisplay::price("Bollinger lower", l.bollinger_lower),
        MetricDisplay::price("ATR (14)", l.atr),
        MetricDisplay::new("Stochastic %K", level(l.stochastic_k)),
        MetricDisplay::new("Stochastic %D", level(l.stochastic_d)),
    ];

    let mut lines = vec![format!(
        "Technical indicators for {} as of {} (close {:.2})",
        ind.symbol.bold(),
        l.date,
        l.close
    )];
    lines.push(format_table(&rows, ""));
    match l.rsi {
        Some(r) if r >= 70.0 => lines.push(format!("{} RSI is overbought", "▲".red())),
        Some(r) if r <= 30.0 => lines.push(format!("{} RSI is oversold", "▼".green())),
        _ => {}
    }
    lines.join("\n")
}

pub fn analysis(a: &Analysis) -> String {
    let mut lines = fundamentals_lines(&a.fundamentals);
    if let Some(report) = &a.news {
        lines.push(String::new());
        lines.push(news(report));
    }
    if let Some(ind) = &a.indicators {
        lines.push(String::new());
        lines.push(indicators(ind));
    }
    if let Some(f) = &a.forecast {
        lines.push(String::new());
        lines.push(forecast(f));
    }
    lines.extend(warnings(&a.warnings, a.outdated));
    lines.join("\n")
}

fn warnings(warnings: &[String], outdated: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if outdated {
        lines.push(format!(
            "{} {}",
            "⚠".yellow(),
            "some data is outdated: a source was unavailable".yellow()
        ));
    }
    for w in warnings {
        lines.push(format!("{} {}", "⚠".yellow(), w));
    }
    lines
}

pub fn cache_status(stats: Option<&CacheStats>, location: &str) -> String {
    let Some(stats) = stats else {
        return format!("{} Cache disabled or unavailable ({})", "○".dimmed(), location);
    };

    let mut lines = vec![
        "Cache Status".bold().to_string(),
        "────────────────────────────────────────".to_string(),
        format!("Location:       {}", location),
        format!("Valid entries:  {}", stats.valid_entries),
        format!("Expired:        {}", stats.expired_entries),
        format!("Total size:     {}", format_size(stats.total_size_bytes)),
    ];
    if let Some(oldest) = stats.oldest_entry {
        lines.push(format!("Oldest entry:   {}", local_time(oldest)));
    }
    if let Some(newest) = stats.newest_entry {
        lines.push(format!("Newest entry:   {}", local_time(newest)));
    }
    if !stats.by_category.is_empty() {
        let rows: Vec<CategoryDisplay> =
            stats.by_category.iter().map(CategoryDisplay::from).collect();
        lines.push(format_table(&rows, ""));
    }
    lines.join("\n")
}

fn local_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
