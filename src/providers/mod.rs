pub mod coingecko;
pub mod exchangerate;
pub mod util;

pub use coingecko::CoinGeckoProvider;
pub use exchangerate::ExchangeRateProvider;

use crate::core::config::{EXCHANGERATE_API_KEY_ENV, ProvidersConfig};
use crate::core::provider::ProviderRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

/// Builds the registry from configuration. A provider that is not
/// configured is left out; its market then has no source.
pub fn build_registry(config: &ProvidersConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    let timeout = config.timeout();

    if let Some(coingecko) = &config.coingecko {
        let provider = CoinGeckoProvider::new(&coingecko.base_url, coingecko.api_key.clone(), timeout)
            .context("Failed to create CoinGecko provider")?;
        registry.register(Arc::new(provider));
    }

    if let Some(exchangerate) = &config.exchangerate {
        match &exchangerate.api_key {
            Some(key) => {
                let provider = ExchangeRateProvider::new(&exchangerate.base_url, key, timeout)
                    .context("Failed to create ExchangeRate-API provider")?;
                registry.register(Arc::new(provider));
            }
            None => warn!(
                "No ExchangeRate-API key configured, set {EXCHANGERATE_API_KEY_ENV} to refresh fiat rates"
            ),
        }
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExchangeRateConfig;
    use crate::core::currency::MarketClass;

    #[test]
    fn test_fiat_provider_needs_api_key() {
        let mut config = ProvidersConfig {
            exchangerate: Some(ExchangeRateConfig::default()),
            ..Default::default()
        };
        let registry = build_registry(&config).unwrap();
        assert!(registry.get(MarketClass::Crypto).is_some());
        assert!(registry.get(MarketClass::Fiat).is_none());

        if let Some(e) = config.exchangerate.as_mut() {
            e.api_key = Some("key".to_string());
        }
        let registry = build_registry(&config).unwrap();
        assert!(registry.get(MarketClass::Fiat).is_some());
    }

    #[test]
    fn test_disabled_providers_are_skipped() {
        let config = ProvidersConfig {
            coingecko: None,
            exchangerate: None,
            timeout_seconds: 5,
        };
        assert!(build_registry(&config).unwrap().is_empty());
    }
}
