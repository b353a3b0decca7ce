use crate::core::error::ProviderError;
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Builds the HTTP client shared by one provider.
pub fn http_client(provider: &str, timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("fxtrade/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| unavailable(provider, e))
}

pub fn unavailable(provider: &str, reason: impl ToString) -> ProviderError {
    ProviderError::Unavailable {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

/// Sends the request and decodes a JSON body.
///
/// HTTP 429 becomes `RateLimited`; transport errors, other non-2xx statuses
/// and undecodable bodies become `Unavailable`.
pub async fn get_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(|e| unavailable(provider, e))?;
    let response = check_status(provider, response)?;
    let body = response
        .text()
        .await
        .map_err(|e| unavailable(provider, e))?;

    serde_json::from_str(&body).map_err(|e| {
        debug!(error = ?e, response = %body, "Failed to parse {provider} response");
        unavailable(provider, format!("invalid response body: {e}"))
    })
}

fn check_status(provider: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(ProviderError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        });
    }
    if !status.is_success() {
        return Err(unavailable(provider, format!("HTTP {status}")));
    }
    Ok(response)
}

/// Converts a JSON number to a `Decimal` without going through `f64`.
pub fn decimal_from_json(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn number(text: &str) -> serde_json::Number {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&number("59337.21")), Some(dec!(59337.21)));
        assert_eq!(decimal_from_json(&number("42")), Some(dec!(42)));
        assert_eq!(decimal_from_json(&number("1.5e-5")), Some(dec!(0.000015)));
    }
}
