//! Command execution context
//!
//! Loads configuration once and builds the service every data command uses.

use log::debug;

use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::market::MarketClient;
use crate::service::StockService;

/// Shared state for data commands: configuration, service and output format.
pub struct CommandContext {
    pub config: Config,
    pub service: StockService<MarketClient>,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load config from `--config` (or the default location), open the cache
    /// unless `--no-cache` was given, and build the market client.
    ///
    /// # Errors
    /// Returns error if the config cannot be loaded or the HTTP client cannot
    /// be built. An unusable cache is not an error; it degrades to bypass.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_at(opts.config_ref())?;
        let service = StockService::from_config(&config, opts.no_cache)?;
        debug!(
            "Context ready (persistent cache: {}, news key: {})",
            service.coordinator().is_persistent(),
            config.news_api_key.is_some()
        );

        Ok(Self {
            config,
            service,
            format: opts.format,
        })
    }
}
