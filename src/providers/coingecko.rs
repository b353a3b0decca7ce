use super::util::{decimal_from_json, get_json, http_client};
use crate::core::{
    currency::{MarketClass, RatePair},
    error::ProviderError,
    provider::RateProvider,
    rate::RateObservation,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const NAME: &str = "CoinGecko";

// {"bitcoin": {"usd": 59337.21}, ...}
type SimplePriceResponse = HashMap<String, HashMap<String, serde_json::Number>>;

/// Crypto rates from a CoinGecko style `/simple/price` endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl CoinGeckoProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: http_client(NAME, timeout)?,
        })
    }

    fn price_of(response: &SimplePriceResponse, pair: &RatePair) -> Result<Decimal, String> {
        let id = pair
            .from()
            .provider_id()
            .ok_or_else(|| format!("{} has no CoinGecko id", pair.from()))?;
        let quote = pair.to().code().to_lowercase();
        let number = response
            .get(id)
            .and_then(|prices| prices.get(&quote))
            .ok_or_else(|| format!("no {quote} price for {id}"))?;
        match decimal_from_json(number) {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            _ => Err(format!("invalid price {number} for {id}")),
        }
    }
}

#[async_trait]
impl RateProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn market(&self) -> MarketClass {
        MarketClass::Crypto
    }

    #[instrument(name = "coingecko_fetch", skip(self, pairs), fields(pairs = pairs.len()))]
    async fn fetch(
        &self,
        pairs: &BTreeSet<RatePair>,
    ) -> Result<Vec<RateObservation>, ProviderError> {
        let ids: BTreeSet<_> = pairs.iter().filter_map(|p| p.from().provider_id()).collect();
        let quotes: BTreeSet<_> = pairs.iter().map(|p| p.to().code().to_lowercase()).collect();
        let ids = ids.into_iter().collect::<Vec<_>>().join(",");
        let quotes = quotes.into_iter().collect::<Vec<_>>().join(",");

        let mut url = format!(
            "{}/simple/price?ids={ids}&vs_currencies={quotes}",
            self.base_url
        );
        debug!(%url, "Requesting crypto prices");
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&x_cg_demo_api_key={key}"));
        }

        let response: SimplePriceResponse = get_json(NAME, self.client.get(&url)).await?;
        let received_at = Utc::now();

        let mut observations = Vec::new();
        let mut failed = Vec::new();
        for pair in pairs {
            let observation = Self::price_of(&response, pair).and_then(|rate| {
                RateObservation::new(*pair, rate, NAME, received_at).map_err(|e| e.to_string())
            });
            match observation {
                Ok(obs) => observations.push(obs),
                Err(reason) => {
                    warn!(%pair, %reason, "CoinGecko returned no usable price");
                    failed.push((*pair, reason));
                }
            }
        }

        if failed.is_empty() {
            Ok(observations)
        } else {
            Err(ProviderError::Partial {
                provider: NAME.to_string(),
                observations,
                failed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::core::provider::pairs_for;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOCK_JSON: &str = r#"{
        "bitcoin": {"usd": 59337.21},
        "ethereum": {"usd": 3401.17},
        "solana": {"usd": 145.5}
    }"#;

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin,ethereum,solana"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(server: &MockServer) -> CoinGeckoProvider {
        CoinGeckoProvider::new(&server.uri(), None, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_all_crypto_pairs() {
        let server = create_mock_server(200, MOCK_JSON).await;
        let observations = provider(&server)
            .fetch(&pairs_for(MarketClass::Crypto))
            .await
            .unwrap();

        assert_eq!(observations.len(), 3);
        let btc = &observations[0];
        assert_eq!(btc.pair().from(), CurrencyCode::Btc);
        assert_eq!(btc.rate(), dec!(59337.21));
        assert_eq!(btc.source(), NAME);
        assert_eq!(observations[1].rate(), dec!(3401.17));
        assert_eq!(observations[2].rate(), dec!(145.5));
    }

    #[tokio::test]
    async fn test_missing_coin_is_partial() {
        let server =
            create_mock_server(200, r#"{"bitcoin": {"usd": 95000}, "ethereum": {"usd": 0}}"#)
                .await;
        let err = provider(&server)
            .fetch(&pairs_for(MarketClass::Crypto))
            .await
            .unwrap_err();

        let ProviderError::Partial {
            observations,
            failed,
            ..
        } = err
        else {
            panic!("expected partial result, got {err:?}");
        };
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].rate(), dec!(95000));
        let failed: Vec<_> = failed.iter().map(|(p, _)| p.from()).collect();
        assert_eq!(failed, vec![CurrencyCode::Eth, CurrencyCode::Sol]);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .fetch(&pairs_for(MarketClass::Crypto))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after: Some(30),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = create_mock_server(500, "oops").await;
        let err = provider(&server)
            .fetch(&pairs_for(MarketClass::Crypto))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_unavailable() {
        let server = create_mock_server(200, "<html>").await;
        let err = provider(&server)
            .fetch(&pairs_for(MarketClass::Crypto))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_sends_api_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("x_cg_demo_api_key", "demo-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_JSON))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = CoinGeckoProvider::new(
            &mock_server.uri(),
            Some("demo-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(provider.fetch(&pairs_for(MarketClass::Crypto)).await.is_ok());
    }
}
