//! Durable storage for the rate snapshot, the rate history and portfolios.
//!
//! Every concern is a small trait so the core can run against the on-disk
//! [`DiskStore`] in the application and the [`MemoryStore`] in tests.

pub mod disk;
pub mod memory;

use crate::core::currency::{CurrencyCode, RatePair};
use crate::core::error::StoreError;
use crate::core::portfolio::Wallet;
use crate::core::rate::{CacheEntry, RateObservation};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use disk::DiskStore;
pub use memory::MemoryStore;

pub const RATES_PARTITION: &str = "rates";
pub const HISTORY_PARTITION: &str = "history";
pub const PORTFOLIOS_PARTITION: &str = "portfolios";

/// Lazy, fallible iterator over stored history records.
pub type HistoryIter<'a> = Box<dyn Iterator<Item = Result<HistoryRecord, StoreError>> + 'a>;

/// Persisted latest-rate snapshot.
pub trait SnapshotStore: Send + Sync {
    fn load_rates(&self) -> Result<Vec<RateObservation>, StoreError>;

    /// Durably writes all entries in one batch.
    fn save_rates(&self, entries: &[CacheEntry]) -> Result<(), StoreError>;
}

/// Append-only rate history keyed by record id.
pub trait HistoryStore: Send + Sync {
    fn contains(&self, id: &str) -> Result<bool, StoreError>;

    /// Writes all records in one batch, durably.
    fn insert_batch(&self, records: &[HistoryRecord]) -> Result<(), StoreError>;

    fn insert(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        self.insert_batch(std::slice::from_ref(record))
    }

    /// Records with `start <= id < end`, in id order.
    fn scan(&self, start: &str, end: &str) -> HistoryIter<'_>;
}

/// Per-user wallets.
pub trait PortfolioStore: Send + Sync {
    fn load_wallet(&self, user: &str) -> Result<Option<Wallet>, StoreError>;

    fn save_wallet(&self, user: &str, wallet: &Wallet) -> Result<(), StoreError>;
}

/// Snapshot value stored under the pair id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub rate: Decimal,
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

impl SnapshotRecord {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        let obs = entry.observation();
        Self {
            rate: obs.rate(),
            updated_at: entry.last_refreshed(),
            source: obs.source().to_string(),
        }
    }

    pub fn into_observation(self, key: &str) -> Result<RateObservation, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        };
        let pair: RatePair = key.parse().map_err(|e| corrupt(format!("{e}")))?;
        RateObservation::new(pair, self.rate, self.source, self.updated_at)
            .map_err(|e| corrupt(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
}

/// One line of the rate history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HistoryMeta>,
}

impl HistoryRecord {
    pub fn from_observation(obs: &RateObservation) -> Self {
        let pair = obs.pair();
        let meta = pair.from().provider_id().map(|raw_id| HistoryMeta {
            raw_id: Some(raw_id.to_string()),
        });
        Self {
            id: obs.id(),
            from: pair.from(),
            to: pair.to(),
            rate: obs.rate(),
            timestamp: obs.timestamp(),
            source: obs.source().to_string(),
            meta,
        }
    }

    pub fn to_observation(&self) -> Result<RateObservation, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.id.clone(),
            reason,
        };
        let pair = RatePair::new(self.from, self.to).map_err(|e| corrupt(e.to_string()))?;
        RateObservation::new(pair, self.rate, self.source.clone(), self.timestamp)
            .map_err(|e| corrupt(e.to_string()))
    }
}

/// Stored form of a user's portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRecord {
    pub user_id: String,
    pub wallets: BTreeMap<CurrencyCode, Decimal>,
}

impl PortfolioRecord {
    pub fn new(user: &str, wallet: &Wallet) -> Self {
        Self {
            user_id: user.to_string(),
            wallets: wallet.balances().clone(),
        }
    }

    pub fn into_wallet(self) -> Result<Wallet, StoreError> {
        Wallet::from_balances(self.wallets).map_err(|reason| StoreError::Corrupt {
            key: self.user_id,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_history_record_format() {
        let pair = RatePair::new(CurrencyCode::Btc, CurrencyCode::Usd).unwrap();
        let ts = "2025-10-10T12:00:01Z".parse::<DateTime<Utc>>().unwrap();
        let obs = RateObservation::new(pair, dec!(59337.21), "CoinGecko", ts).unwrap();

        let record = HistoryRecord::from_observation(&obs);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], "BTC_USD_2025-10-10T12:00:01.000000000Z");
        assert_eq!(json["from"], "BTC");
        assert_eq!(json["to"], "USD");
        assert_eq!(json["rate"], "59337.21");
        assert_eq!(json["source"], "CoinGecko");
        assert_eq!(json["meta"]["raw_id"], "bitcoin");
        assert_eq!(record.to_observation().unwrap(), obs);
    }

    #[test]
    fn test_snapshot_record_rejects_bad_key() {
        let record = SnapshotRecord {
            rate: dec!(1.1),
            updated_at: Utc::now(),
            source: "test".to_string(),
        };
        assert!(matches!(
            record.into_observation("EURUSD"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_portfolio_record_format() {
        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Usd, dec!(10000)).unwrap();
        let record = PortfolioRecord::new("alice", &wallet);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"user_id":"alice","wallets":{"USD":"10000"}}"#);

        let back: PortfolioRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_wallet().unwrap(), wallet);
    }
}
