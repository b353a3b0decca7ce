use super::{HistoryIter, HistoryRecord, HistoryStore, PortfolioStore, SnapshotStore};
use crate::core::error::StoreError;
use crate::core::portfolio::Wallet;
use crate::core::rate::{CacheEntry, RateObservation};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::debug;

/// In-memory store, used by tests and when no data directory is available.
#[derive(Default)]
pub struct MemoryStore {
    rates: RwLock<BTreeMap<String, RateObservation>>,
    history: RwLock<BTreeMap<String, HistoryRecord>>,
    wallets: RwLock<HashMap<String, Wallet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

impl SnapshotStore for MemoryStore {
    fn load_rates(&self) -> Result<Vec<RateObservation>, StoreError> {
        let rates = self.rates.read().map_err(poisoned)?;
        Ok(rates.values().cloned().collect())
    }

    fn save_rates(&self, entries: &[CacheEntry]) -> Result<(), StoreError> {
        let mut rates = self.rates.write().map_err(poisoned)?;
        for entry in entries {
            rates.insert(entry.pair().id(), entry.observation().clone());
        }
        debug!("Memory store PUT {} rates", entries.len());
        Ok(())
    }
}

impl HistoryStore for MemoryStore {
    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.history.read().map_err(poisoned)?.contains_key(id))
    }

    fn insert_batch(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        let mut history = self.history.write().map_err(poisoned)?;
        for record in records {
            history.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn scan(&self, start: &str, end: &str) -> HistoryIter<'_> {
        match self.history.read() {
            Ok(history) => {
                let records: Vec<_> = history
                    .range(start.to_string()..end.to_string())
                    .map(|(_, record)| Ok(record.clone()))
                    .collect();
                Box::new(records.into_iter())
            }
            Err(e) => Box::new(std::iter::once(Err(poisoned(e)))),
        }
    }
}

impl PortfolioStore for MemoryStore {
    fn load_wallet(&self, user: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self.wallets.read().map_err(poisoned)?.get(user).cloned())
    }

    fn save_wallet(&self, user: &str, wallet: &Wallet) -> Result<(), StoreError> {
        self.wallets
            .write()
            .map_err(poisoned)?
            .insert(user.to_string(), wallet.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{CurrencyCode, RatePair};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_history_scan_range() {
        let store = MemoryStore::new();
        let pair = RatePair::new(CurrencyCode::Eth, CurrencyCode::Usd).unwrap();
        let obs = RateObservation::new(pair, dec!(3401.17), "test", Utc::now()).unwrap();
        let record = HistoryRecord::from_observation(&obs);
        store.insert(&record).unwrap();

        assert!(store.contains(&record.id).unwrap());
        assert_eq!(store.scan("ETH_USD_", "ETH_USD_~").count(), 1);
        assert_eq!(store.scan("BTC_USD_", "BTC_USD_~").count(), 0);
    }

    #[test]
    fn test_save_rates_overwrites_by_pair() {
        let store = MemoryStore::new();
        let pair = RatePair::new(CurrencyCode::Gbp, CurrencyCode::Usd).unwrap();
        let first = RateObservation::new(pair, dec!(1.26), "test", Utc::now()).unwrap();
        let second = RateObservation::new(pair, dec!(1.27), "test", Utc::now()).unwrap();

        store.save_rates(&[CacheEntry::new(first)]).unwrap();
        store.save_rates(&[CacheEntry::new(second.clone())]).unwrap();

        assert_eq!(store.load_rates().unwrap(), vec![second]);
    }
}
