use super::util::{decimal_from_json, get_json, http_client, unavailable};
use crate::core::{
    currency::{CurrencyCode, MarketClass, RatePair},
    error::ProviderError,
    provider::RateProvider,
    rate::RateObservation,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const NAME: &str = "ExchangeRate-API";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    conversion_rates: HashMap<String, serde_json::Number>,
}

/// Fiat rates from an ExchangeRate-API style `/latest/{base}` endpoint.
pub struct ExchangeRateProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl ExchangeRateProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: http_client(NAME, timeout)?,
        })
    }

    /// Conversion table quoted in `quote`: units of each currency per one
    /// `quote`.
    async fn latest(&self, quote: CurrencyCode) -> Result<LatestResponse, ProviderError> {
        let url = format!("{}/{}/latest/{}", self.base_url, self.api_key, quote);
        debug!(%quote, "Requesting fiat rates");
        let response: LatestResponse = get_json(NAME, self.client.get(&url)).await?;
        if response.result != "success" {
            let reason = response
                .error_type
                .unwrap_or_else(|| format!("result '{}'", response.result));
            return Err(unavailable(NAME, reason));
        }
        Ok(response)
    }

    fn rate_of(response: &LatestResponse, pair: &RatePair) -> Result<Decimal, String> {
        let code = pair.from().code();
        let number = response
            .conversion_rates
            .get(code)
            .ok_or_else(|| format!("no conversion rate for {code}"))?;
        match decimal_from_json(number) {
            Some(per_quote) if per_quote > Decimal::ZERO => {
                Ok((Decimal::ONE / per_quote).normalize())
            }
            _ => Err(format!("invalid conversion rate {number} for {code}")),
        }
    }
}

#[async_trait]
impl RateProvider for ExchangeRateProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn market(&self) -> MarketClass {
        MarketClass::Fiat
    }

    #[instrument(name = "exchangerate_fetch", skip(self, pairs), fields(pairs = pairs.len()))]
    async fn fetch(
        &self,
        pairs: &BTreeSet<RatePair>,
    ) -> Result<Vec<RateObservation>, ProviderError> {
        let mut by_quote: BTreeMap<CurrencyCode, Vec<RatePair>> = BTreeMap::new();
        for pair in pairs {
            by_quote.entry(pair.to()).or_default().push(*pair);
        }

        let mut observations = Vec::new();
        let mut failed = Vec::new();
        let mut first_error = None;
        for (quote, quote_pairs) in by_quote {
            let response = match self.latest(quote).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%quote, error = %e, "Fiat rate table unavailable");
                    failed.extend(quote_pairs.into_iter().map(|p| (p, e.to_string())));
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            let received_at = Utc::now();

            for pair in quote_pairs {
                let observation = Self::rate_of(&response, &pair).and_then(|rate| {
                    RateObservation::new(pair, rate, NAME, received_at)
                        .map_err(|e| e.to_string())
                });
                match observation {
                    Ok(obs) => observations.push(obs),
                    Err(reason) => {
                        warn!(%pair, %reason, "ExchangeRate-API returned no usable rate");
                        failed.push((pair, reason));
                    }
                }
            }
        }

        if failed.is_empty() {
            Ok(observations)
        } else if observations.is_empty() {
            // Nothing usable: report the request failure itself when there was one.
            Err(first_error
                .unwrap_or_else(|| unavailable(NAME, format!("no rates for {} pairs", failed.len()))))
        } else {
            Err(ProviderError::Partial {
                provider: NAME.to_string(),
                observations,
                failed,
            })
        }
    }
}
