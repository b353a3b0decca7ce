//! Error types shared by the rate and trading core.

use crate::core::currency::{CurrencyCode, RatePair};
use crate::core::rate::RateObservation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::Display;
use thiserror::Error;

/// Rate lookup and validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateError {
    #[error("unknown currency '{0}'")]
    UnknownCurrency(String),
    #[error("invalid currency pair '{0}'")]
    InvalidPair(String),
    #[error("invalid rate {rate} for {pair}: rate must be positive")]
    InvalidRate { pair: RatePair, rate: Decimal },
    #[error("no cached rate for {0}, run update-rates first")]
    Missing(RatePair),
    #[error("rate for {pair} is stale: {age_secs}s old, ttl is {ttl_secs}s")]
    Stale {
        pair: RatePair,
        age_secs: i64,
        ttl_secs: u64,
    },
    #[error("value of {amount} {currency} is out of range")]
    ValueOverflow {
        currency: CurrencyCode,
        amount: Decimal,
    },
}

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to encode or decode record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn backend(err: impl Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Outcomes of writing an observation into the cache or the history log.
///
/// `StaleWrite` and `DuplicateObservation` are advisory: the write was a
/// no-op and callers usually only count them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("rejected {pair} observation from {incoming}: cache already holds {cached}")]
    StaleWrite {
        pair: RatePair,
        incoming: DateTime<Utc>,
        cached: DateTime<Utc>,
    },
    #[error("observation {0} is already recorded")]
    DuplicateObservation(String),
    #[error("failed to persist rates: {0}")]
    Persistence(#[from] StoreError),
}

impl CacheError {
    pub fn is_advisory(&self) -> bool {
        !matches!(self, CacheError::Persistence(_))
    }
}

/// Errors reported by a rate provider for one fetch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },
    #[error("{provider} rate limit exceeded{}", .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },
    #[error("{provider} returned {} rates, {} pairs failed", .observations.len(), .failed.len())]
    Partial {
        provider: String,
        observations: Vec<RateObservation>,
        failed: Vec<(RatePair, String)>,
    },
}

/// Trade execution errors.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("invalid amount {0}: amount must be positive")]
    InvalidAmount(Decimal),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error("insufficient funds: {available} {currency} available, {required} {currency} required")]
    InsufficientFunds {
        currency: CurrencyCode,
        required: Decimal,
        available: Decimal,
    },
    #[error("no portfolio found for user '{0}'")]
    PortfolioNotFound(String),
    #[error("trade was not applied, failed to persist portfolio: {0}")]
    Persistence(#[from] StoreError),
}

impl TradeError {
    /// Short name used in action records.
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::InvalidAmount(_) => "InvalidAmount",
            TradeError::Rate(RateError::Missing(_)) => "Missing",
            TradeError::Rate(RateError::Stale { .. }) => "Stale",
            TradeError::Rate(_) => "InvalidInput",
            TradeError::InsufficientFunds { .. } => "InsufficientFunds",
            TradeError::PortfolioNotFound(_) => "PortfolioNotFound",
            TradeError::Persistence(_) => "Persistence",
        }
    }
}

/// Refresh scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("a refresh cycle is already running")]
    Busy,
    #[error("scheduler is stopped")]
    Stopped,
    #[error("scheduler loop is already started")]
    AlreadyStarted,
}
