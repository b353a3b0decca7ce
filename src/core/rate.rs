//! Rate observations and cache entries

use crate::core::currency::RatePair;
use crate::core::error::RateError;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::fmt::Display;

/// One accepted rate for a pair, as reported by a source at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateObservation {
    pair: RatePair,
    rate: Decimal,
    source: String,
    timestamp: DateTime<Utc>,
}

impl RateObservation {
    pub fn new(
        pair: RatePair,
        rate: Decimal,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RateError> {
        if rate <= Decimal::ZERO {
            return Err(RateError::InvalidRate { pair, rate });
        }
        Ok(Self {
            pair,
            rate,
            source: source.into(),
            timestamp,
        })
    }

    pub fn pair(&self) -> RatePair {
        self.pair
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// History identifier: pair id plus a fixed width RFC 3339 timestamp, so
    /// identifiers of one pair sort chronologically.
    pub fn id(&self) -> String {
        format!("{}_{}", self.pair, format_timestamp(self.timestamp))
    }

    /// The same observation expressed for the inverse pair.
    pub fn inverted(&self) -> Self {
        Self {
            pair: self.pair.inverse(),
            rate: (Decimal::ONE / self.rate).normalize(),
            source: self.source.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl Display for RateObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "1 {} = {} {} ({}, {})",
            self.pair.from(),
            self.rate,
            self.pair.to(),
            self.source,
            format_timestamp(self.timestamp)
        )
    }
}

/// Latest accepted observation for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    observation: RateObservation,
}

impl CacheEntry {
    pub fn new(observation: RateObservation) -> Self {
        Self { observation }
    }

    pub fn pair(&self) -> RatePair {
        self.observation.pair()
    }

    pub fn observation(&self) -> &RateObservation {
        &self.observation
    }

    pub fn last_refreshed(&self) -> DateTime<Utc> {
        self.observation.timestamp()
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_refreshed()
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
