//! CLI command definitions and handlers

use clap::{Parser, Subcommand};

pub mod args;
pub mod cache;
pub mod context;
pub mod init;
pub mod market;
pub mod stock;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// Articles listed by `news` and `analyze` unless told otherwise
pub const DEFAULT_NEWS_LIMIT: usize = 10;

/// stockcast - cached market data and price forecasts for equities
#[derive(Parser, Debug)]
#[command(name = "stockcast")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, json)
    #[arg(
        long,
        global = true,
        env = "STOCKCAST_FORMAT",
        default_value = "pretty",
        hide_env = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "STOCKCAST_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "STOCKCAST_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Bypass cache, fetch fresh data from the sources
    #[arg(long, global = true, env = "STOCKCAST_NO_CACHE", hide_env = true)]
    pub no_cache: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show company fundamentals and price statistics
    Fundamentals {
        /// Ticker, e.g. RELIANCE.NS (bare NSE tickers are resolved)
        symbol: String,
    },

    /// Show daily price history
    History {
        /// Ticker symbol
        symbol: String,

        /// Range: 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max
        #[arg(long, short = 'r', default_value = crate::market::DEFAULT_HISTORY_RANGE)]
        range: String,

        /// Show only the most recent N bars
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Show technical indicators (RSI, MACD, moving averages, Bollinger, ATR, stochastic)
    Indicators {
        /// Ticker symbol
        symbol: String,

        /// History range the indicators are computed over
        #[arg(long, short = 'r', default_value = crate::market::DEFAULT_HISTORY_RANGE)]
        range: String,
    },

    /// Show company news with sentiment
    News {
        /// Ticker symbol
        symbol: String,

        /// Maximum articles to list
        #[arg(long, short = 'n', default_value_t = DEFAULT_NEWS_LIMIT)]
        limit: usize,
    },

    /// Show market indices and market news
    Market {
        /// Maximum articles to list
        #[arg(long, short = 'n', default_value_t = DEFAULT_NEWS_LIMIT)]
        limit: usize,
    },

    /// Forecast the price path (never cached)
    Predict {
        /// Ticker symbol
        symbol: String,
    },

    /// Fundamentals, news sentiment, indicators and forecast together
    Analyze {
        /// Ticker symbol
        symbol: String,

        /// Maximum articles to list
        #[arg(long, short = 'n', default_value_t = DEFAULT_NEWS_LIMIT)]
        limit: usize,
    },

    /// Manage the local data cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Write the configuration file
    Init {
        /// NewsAPI key used for news and sentiment
        #[arg(long)]
        news_api_key: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,

    /// Remove entries: a category (fundamentals, history, news, indices), expired, or all
    Clear {
        /// What to remove
        #[arg(default_value = "expired")]
        scope: String,
    },

    /// Print cache location
    Path,
}
