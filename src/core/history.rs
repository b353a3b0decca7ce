//! Append-only ledger of accepted rate observations

use crate::core::currency::RatePair;
use crate::core::error::{CacheError, StoreError};
use crate::core::rate::{RateObservation, format_timestamp};
use crate::store::{HistoryRecord, HistoryStore};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Half-open time window `[start, end)`; `None` leaves a side unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }
}

pub struct RateHistoryLog {
    store: Arc<dyn HistoryStore>,
    // Serializes the duplicate check with the insert.
    append_lock: Mutex<()>,
}

impl RateHistoryLog {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            append_lock: Mutex::new(()),
        }
    }

    /// Records an observation. The first write of a pair and timestamp wins,
    /// later ones report `DuplicateObservation` and store nothing.
    pub fn append(&self, observation: &RateObservation) -> Result<(), CacheError> {
        match self.append_batch(std::slice::from_ref(observation))?[..] {
            [true] => Ok(()),
            _ => Err(CacheError::DuplicateObservation(observation.id())),
        }
    }

    /// Records several observations with a single store write. The result
    /// tells, per observation, whether it was recorded (`false` for a
    /// duplicate, including one repeated inside the batch).
    pub fn append_batch(&self, observations: &[RateObservation]) -> Result<Vec<bool>, StoreError> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| StoreError::Backend("history lock poisoned".to_string()))?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut recorded = Vec::with_capacity(observations.len());
        for observation in observations {
            let record = HistoryRecord::from_observation(observation);
            if seen.contains(&record.id) || self.store.contains(&record.id)? {
                debug!(id = %record.id, "Duplicate history record");
                recorded.push(false);
                continue;
            }
            seen.insert(record.id.clone());
            records.push(record);
            recorded.push(true);
        }

        self.store.insert_batch(&records)?;
        debug!(count = records.len(), "History APPEND");
        Ok(recorded)
    }

    /// Observations of `pair` inside `range`, oldest first. The iterator reads
    /// lazily from the store; calling `query` again starts a fresh scan.
    pub fn query(
        &self,
        pair: RatePair,
        range: TimeRange,
    ) -> impl Iterator<Item = Result<RateObservation, StoreError>> + '_ {
        let prefix = format!("{pair}_");
        let start = match range.start {
            Some(ts) => format!("{prefix}{}", format_timestamp(ts)),
            None => prefix.clone(),
        };
        // '~' sorts after every timestamp character.
        let end = match range.end {
            Some(ts) => format!("{prefix}{}", format_timestamp(ts)),
            None => format!("{prefix}~"),
        };
        self.store
            .scan(&start, &end)
            .map(|record| record.and_then(|r| r.to_observation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyCode;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn log() -> RateHistoryLog {
        RateHistoryLog::new(Arc::new(MemoryStore::new()))
    }

    fn obs(pair: RatePair, rate: rust_decimal::Decimal, ts: DateTime<Utc>) -> RateObservation {
        RateObservation::new(pair, rate, "test", ts).unwrap()
    }

    #[test]
    fn test_duplicate_append_keeps_first_write() {
        let log = log();
        let pair = RatePair::new(CurrencyCode::Btc, CurrencyCode::Usd).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        log.append(&obs(pair, dec!(95000), ts)).unwrap();
        let second = log.append(&obs(pair, dec!(96000), ts));
        assert!(matches!(second, Err(CacheError::DuplicateObservation(_))));

        let stored: Vec<_> = log
            .query(pair, TimeRange::all())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rate(), dec!(95000));
    }

    #[test]
    fn test_append_batch_flags_duplicates() {
        let log = log();
        let pair = RatePair::new(CurrencyCode::Eth, CurrencyCode::Usd).unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        log.append(&obs(pair, dec!(3000), ts)).unwrap();

        let later = ts + Duration::seconds(1);
        let recorded = log
            .append_batch(&[
                obs(pair, dec!(3001), ts),
                obs(pair, dec!(3002), later),
                obs(pair, dec!(3003), later),
            ])
            .unwrap();
        assert_eq!(recorded, vec![false, true, false]);

        let rates: Vec<_> = log
            .query(pair, TimeRange::all())
            .map(|o| o.unwrap().rate())
            .collect();
        assert_eq!(rates, vec![dec!(3000), dec!(3002)]);
    }

    #[test]
    fn test_query_filters_pair_and_range() {
        let log = log();
        let btc = RatePair::new(CurrencyCode::Btc, CurrencyCode::Usd).unwrap();
        let eth = RatePair::new(CurrencyCode::Eth, CurrencyCode::Usd).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        for hour in [2, 0, 1, 3] {
            log.append(&obs(btc, dec!(100) + rust_decimal::Decimal::from(hour), t0 + Duration::hours(hour)))
                .unwrap();
        }
        log.append(&obs(eth, dec!(3000), t0 + Duration::hours(1))).unwrap();

        let rates: Vec<_> = log
            .query(btc, TimeRange::all())
            .map(|o| o.unwrap().rate())
            .collect();
        assert_eq!(rates, vec![dec!(100), dec!(101), dec!(102), dec!(103)]);

        let window: Vec<_> = log
            .query(btc, TimeRange::between(t0 + Duration::hours(1), t0 + Duration::hours(3)))
            .map(|o| o.unwrap().timestamp())
            .collect();
        assert_eq!(window, vec![t0 + Duration::hours(1), t0 + Duration::hours(2)]);

        let since: Vec<_> = log
            .query(btc, TimeRange::since(t0 + Duration::hours(3)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(since.len(), 1);
    }

    #[test]
    fn test_query_is_restartable() {
        let log = log();
        let pair = RatePair::new(CurrencyCode::Eur, CurrencyCode::Usd).unwrap();
        log.append(&obs(pair, dec!(1.08), Utc::now())).unwrap();

        assert_eq!(log.query(pair, TimeRange::all()).count(), 1);
        assert_eq!(log.query(pair, TimeRange::all()).count(), 1);
    }
}
