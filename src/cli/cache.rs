//! Cache management commands

use std::path::{Path, PathBuf};

use colored::Colorize;
use log::debug;

use crate::cache::{CacheStorage, FetchCoordinator, InvalidateScope, TtlPolicy};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::output::json::format_json;
use crate::output::pretty::{self, format_size};

/// Directory holding the cache database
fn cache_location(config: &Config) -> Result<PathBuf> {
    match &config.cache_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(CacheStorage::cache_dir()?),
    }
}

/// Open the store for maintenance.
///
/// Unlike data commands, which fall back to running uncached, a store that
/// cannot be opened here is an error.
fn open(location: &Path) -> Result<CacheStorage> {
    debug!("Opening cache at {}", location.display());
    Ok(CacheStorage::open_at(location, TtlPolicy::standard())?)
}

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let config = Config::load_at(opts.config_ref())?;
    let location = cache_location(&config)?;
    let stats = if opts.no_cache {
        None
    } else {
        Some(open(&location)?.stats()?)
    };
    let path = location.display().to_string();

    match opts.format {
        OutputFormat::Json => {
            let data = match &stats {
                Some(stats) => serde_json::json!({
                    "enabled": true,
                    "path": path,
                    "total_entries": stats.total_entries,
                    "valid_entries": stats.valid_entries,
                    "expired_entries": stats.expired_entries,
                    "total_size_bytes": stats.total_size_bytes,
                    "total_size_human": format_size(stats.total_size_bytes),
                    "oldest_entry": stats.oldest_entry,
                    "newest_entry": stats.newest_entry,
                    "by_category": stats
                        .by_category
                        .iter()
                        .map(|(c, n)| (c.to_string(), serde_json::json!(n)))
                        .collect::<serde_json::Map<_, _>>(),
                }),
                None => serde_json::json!({ "enabled": false, "path": path }),
            };
            println!("{}", format_json(&data)?);
        }
        OutputFormat::Pretty => {
            println!("{}", pretty::cache_status(stats.as_ref(), &path));
        }
    }

    Ok(())
}

/// Remove a category, the expired entries, or everything
pub fn clear(opts: &GlobalOptions, scope: &str) -> Result<()> {
    let scope: InvalidateScope = scope.parse()?;
    let config = Config::load_at(opts.config_ref())?;
    let removed = FetchCoordinator::new(open(&cache_location(&config)?)?).invalidate(&scope)?;

    match opts.format {
        OutputFormat::Json => {
            let data = serde_json::json!({
                "scope": scope.to_string(),
                "entries_removed": removed,
            });
            println!("{}", format_json(&data)?);
        }
        OutputFormat::Pretty => {
            if removed > 0 {
                println!("{} Removed {} cache entries ({})", "✓".green(), removed, scope);
            } else {
                println!("No cache entries matched ({})", scope);
            }
        }
    }

    Ok(())
}

/// Show cache path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let config = Config::load_at(opts.config_ref())?;
    println!("{}", cache_location(&config)?.display());
    Ok(())
}
