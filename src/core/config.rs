use crate::core::currency::CurrencyCode;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const EXCHANGERATE_API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";
pub const COINGECKO_API_KEY_ENV: &str = "COINGECKO_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RatesConfig {
    /// Maximum age of a cached rate usable for trading.
    pub ttl_seconds: u64,
    pub cache_enabled: bool,
    /// Interval between scheduled refresh cycles, start to start.
    pub refresh_interval_seconds: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            ttl_seconds: 3600,
            cache_enabled: true,
            refresh_interval_seconds: 300,
        }
    }
}

impl RatesConfig {
    pub fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        CoinGeckoConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeRateConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        ExchangeRateConfig {
            base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoConfig>,
    pub exchangerate: Option<ExchangeRateConfig>,
    pub timeout_seconds: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoConfig::default()),
            exchangerate: Some(ExchangeRateConfig::default()),
            timeout_seconds: 10,
        }
    }
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_base_currency")]
    pub base_currency: CurrencyCode,
    pub data_path: Option<String>,
}

fn default_base_currency() -> CurrencyCode {
    CurrencyCode::Usd
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            rates: RatesConfig::default(),
            providers: ProvidersConfig::default(),
            base_currency: default_base_currency(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            let mut config = Self::default();
            config.apply_env();
            return Ok(config);
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "fxtrade", "fxtrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "fxtrade", "fxtrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.apply_env();
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rates.ttl_seconds == 0 {
            bail!("rates.ttl_seconds must be positive");
        }
        if self.rates.refresh_interval_seconds == 0 {
            bail!("rates.refresh_interval_seconds must be positive");
        }
        if self.providers.timeout_seconds == 0 {
            bail!("providers.timeout_seconds must be positive");
        }
        Ok(())
    }

    /// API keys from the environment take precedence over the file.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(EXCHANGERATE_API_KEY_ENV) {
            if let Some(exchangerate) = self.providers.exchangerate.as_mut() {
                exchangerate.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var(COINGECKO_API_KEY_ENV) {
            if let Some(coingecko) = self.providers.coingecko.as_mut() {
                coingecko.api_key = Some(key);
            }
        }
    }
}
