//! Configuration management for stockcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::forecast::GateConfig;
use crate::market::is_valid_range;

/// Environment variable that overrides the NewsAPI key from the file
pub const NEWS_API_KEY_ENV: &str = "NEWS_API_KEY";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// NewsAPI key for company and market news
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_api_key: Option<String>,

    /// Cache directory (defaults to the platform cache dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Seconds a market data request may run before it counts as failed
    #[serde(default = "default_producer_timeout")]
    pub producer_timeout_secs: u64,

    #[serde(default)]
    pub forecast: ForecastSettings,
}

/// Forecast preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSettings {
    /// Trading days to project
    #[serde(default = "default_horizon")]
    pub horizon_days: usize,

    /// History range the model is trained on
    #[serde(default = "default_history_range")]
    pub history_range: String,

    /// Upper bound on one prediction, history fetch included
    #[serde(default = "default_forecast_timeout")]
    pub timeout_secs: u64,
}

fn default_producer_timeout() -> u64 {
    30
}

fn default_horizon() -> usize {
    7
}

fn default_history_range() -> String {
    crate::market::DEFAULT_HISTORY_RANGE.to_string()
}

fn default_forecast_timeout() -> u64 {
    120
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon(),
            history_range: default_history_range(),
            timeout_secs: default_forecast_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            news_api_key: None,
            cache_dir: None,
            producer_timeout_secs: default_producer_timeout(),
            forecast: ForecastSettings::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".stockcast").join("config.yaml"))
    }

    /// Resolve an explicit path or fall back to the default one
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration, then apply environment overrides.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(Path::new(p))?,
            None => {
                let default = Self::default_path()?;
                if default.exists() {
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(key) = std::env::var(NEWS_API_KEY_ENV)
            && !key.trim().is_empty()
        {
            config.news_api_key = Some(key.trim().to_string());
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Save configuration to an explicit path or the default one
    pub fn save_at(&self, path: Option<&str>) -> Result<PathBuf> {
        let path = Self::resolve_path(path)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        // The file holds an API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast.horizon_days == 0 || self.forecast.horizon_days > 60 {
            return Err(ConfigError::Invalid(format!(
                "forecast.horizon_days must be between 1 and 60, got {}",
                self.forecast.horizon_days
            ))
            .into());
        }
        if !is_valid_range(&self.forecast.history_range) {
            return Err(ConfigError::Invalid(format!(
                "forecast.history_range '{}' is not a supported range",
                self.forecast.history_range
            ))
            .into());
        }
        if self.producer_timeout_secs == 0 {
            return Err(
                ConfigError::Invalid("producer_timeout_secs must be positive".to_string()).into(),
            );
        }
        Ok(())
    }

    pub fn producer_timeout(&self) -> Duration {
        Duration::from_secs(self.producer_timeout_secs)
    }

    /// Inference gate settings; a zero forecast timeout disables the bound
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            horizon_days: self.forecast.horizon_days,
            history_range: self.forecast.history_range.to_ascii_lowercase(),
            timeout: (self.forecast.timeout_secs > 0)
                .then(|| Duration::from_secs(self.forecast.timeout_secs)),
        }
    }
}
