//! Supported currencies and currency pairs

use crate::core::error::RateError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Market a currency is traded in. Each rate provider serves exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketClass {
    Fiat,
    Crypto,
}

impl Display for MarketClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketClass::Fiat => write!(f, "fiat"),
            MarketClass::Crypto => write!(f, "crypto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CurrencyCode {
    Usd,
    Eur,
    Gbp,
    Rub,
    Cny,
    Jpy,
    Btc,
    Eth,
    Sol,
}

impl CurrencyCode {
    pub const ALL: [CurrencyCode; 9] = [
        CurrencyCode::Usd,
        CurrencyCode::Eur,
        CurrencyCode::Gbp,
        CurrencyCode::Rub,
        CurrencyCode::Cny,
        CurrencyCode::Jpy,
        CurrencyCode::Btc,
        CurrencyCode::Eth,
        CurrencyCode::Sol,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CurrencyCode::Usd => "USD",
            CurrencyCode::Eur => "EUR",
            CurrencyCode::Gbp => "GBP",
            CurrencyCode::Rub => "RUB",
            CurrencyCode::Cny => "CNY",
            CurrencyCode::Jpy => "JPY",
            CurrencyCode::Btc => "BTC",
            CurrencyCode::Eth => "ETH",
            CurrencyCode::Sol => "SOL",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CurrencyCode::Usd => "US Dollar",
            CurrencyCode::Eur => "Euro",
            CurrencyCode::Gbp => "British Pound",
            CurrencyCode::Rub => "Russian Ruble",
            CurrencyCode::Cny => "Chinese Yuan",
            CurrencyCode::Jpy => "Japanese Yen",
            CurrencyCode::Btc => "Bitcoin",
            CurrencyCode::Eth => "Ethereum",
            CurrencyCode::Sol => "Solana",
        }
    }

    pub fn market(&self) -> MarketClass {
        match self {
            CurrencyCode::Btc | CurrencyCode::Eth | CurrencyCode::Sol => MarketClass::Crypto,
            _ => MarketClass::Fiat,
        }
    }

    /// Identifier used by crypto price APIs (`bitcoin`, `ethereum`, ...).
    pub fn provider_id(&self) -> Option<&'static str> {
        match self {
            CurrencyCode::Btc => Some("bitcoin"),
            CurrencyCode::Eth => Some("ethereum"),
            CurrencyCode::Sol => Some("solana"),
            _ => None,
        }
    }

    pub fn in_market(market: MarketClass) -> impl Iterator<Item = CurrencyCode> {
        Self::ALL.into_iter().filter(move |c| c.market() == market)
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.code() == upper)
            .ok_or(RateError::UnknownCurrency(s.to_string()))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = RateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.code().to_string()
    }
}

/// Ordered currency pair. The rate of a pair is the number of `to` units per
/// one unit of `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RatePair {
    from: CurrencyCode,
    to: CurrencyCode,
}

impl RatePair {
    pub fn new(from: CurrencyCode, to: CurrencyCode) -> Result<Self, RateError> {
        if from == to {
            return Err(RateError::InvalidPair(format!("{from}_{to}")));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> CurrencyCode {
        self.from
    }

    pub fn to(&self) -> CurrencyCode {
        self.to
    }

    pub fn inverse(&self) -> RatePair {
        RatePair {
            from: self.to,
            to: self.from,
        }
    }

    /// Pair identifier, e.g. `BTC_USD`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.from, self.to)
    }
}

impl Display for RatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.from, self.to)
    }
}

impl FromStr for RatePair {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('_')
            .ok_or_else(|| RateError::InvalidPair(s.to_string()))?;
        RatePair::new(from.parse()?, to.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency_code_is_case_insensitive() {
        assert_eq!("btc".parse::<CurrencyCode>().unwrap(), CurrencyCode::Btc);
        assert_eq!(" Eur ".parse::<CurrencyCode>().unwrap(), CurrencyCode::Eur);
        assert!(matches!(
            "DOGE".parse::<CurrencyCode>(),
            Err(RateError::UnknownCurrency(code)) if code == "DOGE"
        ));
    }

    #[test]
    fn test_market_classes() {
        let crypto: Vec<_> = CurrencyCode::in_market(MarketClass::Crypto).collect();
        assert_eq!(
            crypto,
            vec![CurrencyCode::Btc, CurrencyCode::Eth, CurrencyCode::Sol]
        );
        assert_eq!(CurrencyCode::in_market(MarketClass::Fiat).count(), 6);
        assert_eq!(CurrencyCode::Sol.provider_id(), Some("solana"));
        assert!(CurrencyCode::Usd.provider_id().is_none());
    }

    #[test]
    fn test_pair_rejects_same_currency() {
        assert!(RatePair::new(CurrencyCode::Usd, CurrencyCode::Usd).is_err());
        assert!("USD_USD".parse::<RatePair>().is_err());
    }

    #[test]
    fn test_pair_round_trips_through_id() {
        let pair: RatePair = "btc_usd".parse().unwrap();
        assert_eq!(pair.from(), CurrencyCode::Btc);
        assert_eq!(pair.to(), CurrencyCode::Usd);
        assert_eq!(pair.id(), "BTC_USD");
        assert_eq!(pair.inverse().id(), "USD_BTC");
        assert!("BTCUSD".parse::<RatePair>().is_err());
    }

    #[test]
    fn test_currency_code_serializes_as_string() {
        let json = serde_json::to_string(&CurrencyCode::Eth).unwrap();
        assert_eq!(json, "\"ETH\"");
        let parsed: CurrencyCode = serde_json::from_str("\"jpy\"").unwrap();
        assert_eq!(parsed, CurrencyCode::Jpy);
        assert!(serde_json::from_str::<CurrencyCode>("\"XYZ\"").is_err());
    }
}
