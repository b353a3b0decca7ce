//! Rate provider abstraction and registry

use crate::core::currency::{CurrencyCode, MarketClass, RatePair};
use crate::core::error::ProviderError;
use crate::core::rate::RateObservation;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

/// A remote source of exchange rates for one market class.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Source label written into every observation.
    fn name(&self) -> &str;

    fn market(&self) -> MarketClass;

    /// Fetches the requested pairs. Pairs the source could not price are
    /// reported through `ProviderError::Partial` alongside the ones it could.
    async fn fetch(&self, pairs: &BTreeSet<RatePair>)
    -> Result<Vec<RateObservation>, ProviderError>;
}

/// Which market classes a refresh cycle covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Crypto,
    Fiat,
}

impl SourceFilter {
    pub fn matches(&self, market: MarketClass) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Crypto => market == MarketClass::Crypto,
            SourceFilter::Fiat => market == MarketClass::Fiat,
        }
    }
}

impl FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(SourceFilter::All),
            "crypto" => Ok(SourceFilter::Crypto),
            "fiat" => Ok(SourceFilter::Fiat),
            other => Err(format!("unknown source '{other}', expected all, crypto or fiat")),
        }
    }
}

impl Display for SourceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceFilter::All => "all",
            SourceFilter::Crypto => "crypto",
            SourceFilter::Fiat => "fiat",
        };
        f.write_str(s)
    }
}

/// Pairs refreshed for a market class: every currency of the class quoted in
/// USD.
pub fn pairs_for(market: MarketClass) -> BTreeSet<RatePair> {
    CurrencyCode::in_market(market)
        .filter_map(|code| RatePair::new(code, CurrencyCode::Usd).ok())
        .collect()
}

/// Providers keyed by the market class they serve.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<MarketClass, Arc<dyn RateProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider`, replacing any provider for the same market.
    pub fn register(&mut self, provider: Arc<dyn RateProvider>) {
        self.providers.insert(provider.market(), provider);
    }

    pub fn get(&self, market: MarketClass) -> Option<&Arc<dyn RateProvider>> {
        self.providers.get(&market)
    }

    pub fn matching(
        &self,
        filter: SourceFilter,
    ) -> impl Iterator<Item = &Arc<dyn RateProvider>> + '_ {
        self.providers
            .iter()
            .filter(move |(market, _)| filter.matches(**market))
            .map(|(_, provider)| provider)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopProvider(MarketClass);

    #[async_trait]
    impl RateProvider for NoopProvider {
        fn name(&self) -> &str {
            "noop"
        }

        fn market(&self) -> MarketClass {
            self.0
        }

        async fn fetch(
            &self,
            _pairs: &BTreeSet<RatePair>,
        ) -> Result<Vec<RateObservation>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_pairs_for_market() {
        let crypto: Vec<_> = pairs_for(MarketClass::Crypto)
            .into_iter()
            .map(|p| p.id())
            .collect();
        assert_eq!(crypto, vec!["BTC_USD", "ETH_USD", "SOL_USD"]);

        let fiat = pairs_for(MarketClass::Fiat);
        assert_eq!(fiat.len(), 5);
        assert!(fiat.iter().all(|p| p.to() == CurrencyCode::Usd));
    }

    #[test]
    fn test_registry_filters_by_market() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(NoopProvider(MarketClass::Crypto)));
        registry.register(Arc::new(NoopProvider(MarketClass::Fiat)));

        assert_eq!(registry.matching(SourceFilter::All).count(), 2);
        let crypto: Vec<_> = registry
            .matching(SourceFilter::Crypto)
            .map(|p| p.market())
            .collect();
        assert_eq!(crypto, vec![MarketClass::Crypto]);
    }

    #[test]
    fn test_source_filter_parse() {
        assert_eq!("Crypto".parse::<SourceFilter>(), Ok(SourceFilter::Crypto));
        assert!("stocks".parse::<SourceFilter>().is_err());
    }
}
