use crate::core::currency::RatePair;
use crate::core::error::{CacheError, RateError, StoreError};
use crate::core::history::RateHistoryLog;
use crate::core::rate::{CacheEntry, RateObservation};
use crate::store::SnapshotStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Result of applying a batch of observations.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub updated: usize,
    pub rejected_stale: usize,
    pub duplicates: usize,
}

/// Latest accepted rate per pair, with a persisted snapshot.
pub struct RateCache {
    entries: RwLock<BTreeMap<RatePair, CacheEntry>>,
    history: Arc<RateHistoryLog>,
    store: Arc<dyn SnapshotStore>,
    enabled: bool,
}

impl RateCache {
    /// Restores the cache from the persisted snapshot.
    pub fn load(
        store: Arc<dyn SnapshotStore>,
        history: Arc<RateHistoryLog>,
        enabled: bool,
    ) -> Result<Self, StoreError> {
        let entries: BTreeMap<_, _> = store
            .load_rates()?
            .into_iter()
            .map(|obs| (obs.pair(), CacheEntry::new(obs)))
            .collect();
        debug!("Restored {} cached rates", entries.len());

        Ok(Self {
            entries: RwLock::new(entries),
            history,
            store,
            enabled,
        })
    }

    pub fn history(&self) -> &RateHistoryLog {
        &self.history
    }

    /// Returns the cached observation for `pair` if it is at most `ttl` old
    /// at `now`.
    pub async fn get(
        &self,
        pair: RatePair,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<RateObservation, RateError> {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(&pair) else {
            debug!(%pair, "Cache MISS");
            return Err(RateError::Missing(pair));
        };

        let age = entry.age(now);
        if !self.enabled || age > ttl {
            debug!(%pair, age_secs = age.num_seconds(), "Cache STALE");
            return Err(RateError::Stale {
                pair,
                age_secs: age.num_seconds(),
                ttl_secs: ttl.num_seconds().max(0) as u64,
            });
        }
        debug!(%pair, "Cache HIT");
        Ok(entry.observation().clone())
    }

    /// Accepts one observation and persists the snapshot.
    pub async fn put(&self, observation: RateObservation) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let pair = observation.pair();
        check_order(entries.get(&pair).map(CacheEntry::last_refreshed), &observation)?;
        self.history.append(&observation)?;
        debug!(%pair, rate = %observation.rate(), "Cache PUT");
        entries.insert(pair, CacheEntry::new(observation));
        self.persist(&entries)
    }

    /// Accepts a batch of observations and persists the snapshot once.
    ///
    /// Stale and duplicate observations are counted, not returned. History
    /// records of the batch are written together. The only error is a failed
    /// write: if the history write fails nothing is applied, if the snapshot
    /// write fails the in-memory cache already holds the accepted
    /// observations.
    pub async fn put_batch(
        &self,
        observations: impl IntoIterator<Item = RateObservation>,
    ) -> Result<BatchOutcome, CacheError> {
        let mut outcome = BatchOutcome::default();
        let mut entries = self.entries.write().await;

        let mut latest: BTreeMap<RatePair, DateTime<Utc>> = entries
            .iter()
            .map(|(pair, entry)| (*pair, entry.last_refreshed()))
            .collect();
        let mut staged = Vec::new();
        for observation in observations {
            let pair = observation.pair();
            match check_order(latest.get(&pair).copied(), &observation) {
                Ok(()) => {
                    latest.insert(pair, observation.timestamp());
                    staged.push(observation);
                }
                Err(_) => outcome.rejected_stale += 1,
            }
        }

        let recorded = self.history.append_batch(&staged).inspect_err(|e| {
            warn!(error = %e, count = staged.len(), "Failed to record observations");
        })?;
        for (observation, recorded) in staged.into_iter().zip(recorded) {
            if !recorded {
                outcome.duplicates += 1;
                continue;
            }
            let pair = observation.pair();
            debug!(%pair, rate = %observation.rate(), "Cache PUT");
            entries.insert(pair, CacheEntry::new(observation));
            outcome.updated += 1;
        }

        if outcome.updated > 0 {
            self.persist(&entries)?;
        }
        Ok(outcome)
    }

    /// All entries ordered by pair.
    pub async fn snapshot_all(&self) -> Vec<CacheEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Most recent refresh time over all entries.
    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .await
            .values()
            .map(CacheEntry::last_refreshed)
            .max()
    }

    fn persist(&self, entries: &BTreeMap<RatePair, CacheEntry>) -> Result<(), CacheError> {
        let snapshot: Vec<_> = entries.values().cloned().collect();
        self.store.save_rates(&snapshot)?;
        Ok(())
    }
}

/// Rejects an observation older than the one already held for its pair.
fn check_order(cached: Option<DateTime<Utc>>, observation: &RateObservation) -> Result<(), CacheError> {
    match cached {
        Some(cached) if observation.timestamp() < cached => {
            let pair = observation.pair();
            debug!(%pair, "Cache REJECT stale write");
            Err(CacheError::StaleWrite {
                pair,
                incoming: observation.timestamp(),
                cached,
            })
        }
        _ => Ok(()),
    }
}
