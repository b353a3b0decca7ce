use super::{
    HISTORY_PARTITION, HistoryIter, HistoryRecord, HistoryStore, PORTFOLIOS_PARTITION,
    PortfolioRecord, PortfolioStore, RATES_PARTITION, SnapshotRecord, SnapshotStore,
};
use crate::core::error::StoreError;
use crate::core::portfolio::Wallet;
use crate::core::rate::{CacheEntry, RateObservation};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

/// fjall backed store. One keyspace, one partition per concern.
pub struct DiskStore {
    keyspace: Keyspace,
    rates: PartitionHandle,
    history: PartitionHandle,
    portfolios: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(StoreError::backend)?;
        let keyspace = Config::new(path).open().map_err(StoreError::backend)?;
        let open = |name: &str| {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .map_err(StoreError::backend)
        };
        let rates = open(RATES_PARTITION)?;
        let history = open(HISTORY_PARTITION)?;
        let portfolios = open(PORTFOLIOS_PARTITION)?;
        debug!("Opened store at {}", path.display());

        Ok(Self {
            keyspace,
            rates,
            history,
            portfolios,
        })
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(StoreError::backend)
    }
}

impl SnapshotStore for DiskStore {
    fn load_rates(&self) -> Result<Vec<RateObservation>, StoreError> {
        let mut observations = Vec::new();
        for item in self.rates.iter() {
            let (key, value) = item.map_err(StoreError::backend)?;
            let key = String::from_utf8_lossy(&key).into_owned();
            let record: SnapshotRecord = serde_json::from_slice(&value)?;
            observations.push(record.into_observation(&key)?);
        }
        debug!("Loaded {} cached rates", observations.len());
        Ok(observations)
    }

    fn save_rates(&self, entries: &[CacheEntry]) -> Result<(), StoreError> {
        let mut batch = self.keyspace.batch();
        for entry in entries {
            let value = serde_json::to_vec(&SnapshotRecord::from_entry(entry))?;
            batch.insert(&self.rates, entry.pair().id(), value);
        }
        batch.commit().map_err(StoreError::backend)?;
        self.sync()?;
        debug!("Persisted {} cached rates", entries.len());
        Ok(())
    }
}

impl HistoryStore for DiskStore {
    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        self.history.contains_key(id).map_err(StoreError::backend)
    }

    fn insert_batch(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut batch = self.keyspace.batch();
        for record in records {
            batch.insert(&self.history, record.id.as_str(), serde_json::to_vec(record)?);
        }
        batch.commit().map_err(StoreError::backend)?;
        self.sync()?;
        debug!("Persisted {} history records", records.len());
        Ok(())
    }

    fn scan(&self, start: &str, end: &str) -> HistoryIter<'_> {
        let range = self.history.range(start.to_string()..end.to_string());
        Box::new(range.map(|item| -> Result<HistoryRecord, StoreError> {
            let (_, value) = item.map_err(StoreError::backend)?;
            Ok(serde_json::from_slice(&value)?)
        }))
    }
}

impl PortfolioStore for DiskStore {
    fn load_wallet(&self, user: &str) -> Result<Option<Wallet>, StoreError> {
        match self.portfolios.get(user).map_err(StoreError::backend)? {
            Some(value) => {
                let record: PortfolioRecord = serde_json::from_slice(&value)?;
                Ok(Some(record.into_wallet()?))
            }
            None => Ok(None),
        }
    }

    fn save_wallet(&self, user: &str, wallet: &Wallet) -> Result<(), StoreError> {
        let value = serde_json::to_vec(&PortfolioRecord::new(user, wallet))?;
        self.portfolios
            .insert(user, value)
            .map_err(StoreError::backend)?;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{CurrencyCode, RatePair};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn observation(from: CurrencyCode, rate: rust_decimal::Decimal, secs_ago: i64) -> RateObservation {
        let pair = RatePair::new(from, CurrencyCode::Usd).unwrap();
        RateObservation::new(pair, rate, "test", Utc::now() - Duration::seconds(secs_ago)).unwrap()
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let btc = observation(CurrencyCode::Btc, dec!(95000), 10);
        let eur = observation(CurrencyCode::Eur, dec!(1.08), 20);
        {
            let store = DiskStore::open(dir.path()).unwrap();
            store
                .save_rates(&[CacheEntry::new(btc.clone()), CacheEntry::new(eur.clone())])
                .unwrap();
        }

        let store = DiskStore::open(dir.path()).unwrap();
        let mut loaded = store.load_rates().unwrap();
        loaded.sort_by_key(|o| o.pair());
        assert_eq!(loaded, vec![eur, btc]);
    }

    #[test]
    fn test_history_scan_is_ordered_and_bounded() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let records: Vec<_> = [30, 10, 20]
            .into_iter()
            .map(|ago| HistoryRecord::from_observation(&observation(CurrencyCode::Btc, dec!(1), ago)))
            .collect();
        for record in &records {
            store.insert(record).unwrap();
        }
        let eth = HistoryRecord::from_observation(&observation(CurrencyCode::Eth, dec!(2), 5));
        store.insert(&eth).unwrap();
        assert!(store.contains(&eth.id).unwrap());

        let scanned: Vec<_> = store
            .scan("BTC_USD_", "BTC_USD_~")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(scanned, vec![records[0].clone(), records[2].clone(), records[1].clone()]);
    }

    #[test]
    fn test_wallet_round_trip() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        assert!(store.load_wallet("alice").unwrap().is_none());

        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Usd, dec!(500.25)).unwrap();
        wallet.credit(CurrencyCode::Btc, dec!(0.1)).unwrap();
        store.save_wallet("alice", &wallet).unwrap();

        assert_eq!(store.load_wallet("alice").unwrap(), Some(wallet));
        assert!(store.load_wallet("bob").unwrap().is_none());
    }
}
