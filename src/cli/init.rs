//! Init command implementation

use colored::Colorize;

use crate::cli::args::GlobalOptions;
use crate::config::Config;
use crate::error::{ConfigError, Result};

/// Write a configuration file with defaults and the given NewsAPI key.
///
/// An existing file is kept unless `force` is set.
pub fn run(opts: &GlobalOptions, news_api_key: Option<String>, force: bool) -> Result<()> {
    let path = Config::resolve_path(opts.config_ref())?;

    if path.exists() && !force {
        return Err(ConfigError::Invalid(format!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        ))
        .into());
    }

    let config = Config {
        news_api_key: news_api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty()),
        ..Config::default()
    };
    config.save_to(&path)?;

    println!("{}", "✓ Configuration written".green());
    println!("  {}", path.display());
    if config.news_api_key.is_none() {
        println!(
            "{}",
            "⚠ No NewsAPI key set: news and sentiment need --news-api-key or NEWS_API_KEY."
                .yellow()
        );
    }
    println!("\nTry: {}", "stockcast analyze RELIANCE.NS".cyan());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use tempfile::TempDir;

    fn opts_for(path: &std::path::Path) -> GlobalOptions {
        GlobalOptions {
            format: OutputFormat::Pretty,
            config: Some(path.to_string_lossy().into_owned()),
            no_cache: false,
        }
    }

    #[test]
    fn test_init_writes_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        run(&opts_for(&path), Some(" key-1 ".to_string()), false).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.news_api_key.as_deref(), Some("key-1"));
        assert_eq!(config.forecast.horizon_days, 7);
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        run(&opts_for(&path), Some("first".to_string()), false).unwrap();

        let err = run(&opts_for(&path), Some("second".to_string()), false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        run(&opts_for(&path), Some("second".to_string()), true).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.news_api_key.as_deref(), Some("second"));
    }
}
