//! Periodic and on-demand rate refresh

use crate::core::cache::{BatchOutcome, RateCache};
use crate::core::error::{ProviderError, SchedulerError};
use crate::core::provider::{ProviderRegistry, SourceFilter, pairs_for};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Counts from one refresh cycle.
#[derive(Debug, Default, Clone)]
pub struct RefreshSummary {
    pub updated: usize,
    pub rejected_stale: usize,
    pub duplicates: usize,
    /// Pairs that could not be refreshed.
    pub failed: usize,
    pub errors: Vec<String>,
    pub elapsed: Duration,
}

impl RefreshSummary {
    fn absorb(&mut self, outcome: BatchOutcome) {
        self.updated += outcome.updated;
        self.rejected_stale += outcome.rejected_stale;
        self.duplicates += outcome.duplicates;
    }
}

impl Display for RefreshSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "updated {}, stale {}, duplicate {}, failed {} in {:.2}s",
            self.updated,
            self.rejected_stale,
            self.duplicates,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}

struct Inner {
    state: SchedulerState,
    stop_requested: bool,
}

/// Drives refresh cycles over the provider registry into the rate cache.
pub struct RefreshScheduler {
    cache: Arc<RateCache>,
    registry: ProviderRegistry,
    inner: Mutex<Inner>,
    stop_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl RefreshScheduler {
    pub fn new(cache: Arc<RateCache>, registry: ProviderRegistry) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            cache,
            registry,
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                stop_requested: false,
            }),
            stop_tx,
            started: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    /// Runs one refresh cycle over the providers matching `filter`.
    ///
    /// Fails with `Busy` while another cycle is in flight and with `Stopped`
    /// once the scheduler has been stopped. Provider failures never fail the
    /// cycle; they are counted in the summary.
    pub async fn run_once(&self, filter: SourceFilter) -> Result<RefreshSummary, SchedulerError> {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SchedulerState::Running => return Err(SchedulerError::Busy),
                SchedulerState::Stopped => return Err(SchedulerError::Stopped),
                SchedulerState::Idle => inner.state = SchedulerState::Running,
            }
        }

        let summary = self.refresh(filter).await;

        let mut inner = self.inner.lock().await;
        inner.state = if inner.stop_requested {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        };
        info!(%filter, "Refresh cycle finished: {summary}");
        Ok(summary)
    }

    async fn refresh(&self, filter: SourceFilter) -> RefreshSummary {
        let started = Instant::now();
        let mut summary = RefreshSummary::default();

        let mut fetches: FuturesUnordered<_> = self
            .registry
            .matching(filter)
            .map(|provider| {
                let provider = Arc::clone(provider);
                async move {
                    let pairs = pairs_for(provider.market());
                    let result = provider.fetch(&pairs).await;
                    (provider, pairs.len(), result)
                }
            })
            .collect();

        if fetches.is_empty() {
            warn!(%filter, "No rate providers configured");
        }

        while let Some((provider, requested, result)) = fetches.next().await {
            let observations = match result {
                Ok(observations) => observations,
                Err(ProviderError::Partial {
                    observations,
                    failed,
                    ..
                }) => {
                    warn!(
                        provider = provider.name(),
                        failed = failed.len(),
                        "Partial provider result"
                    );
                    summary.failed += failed.len();
                    summary.errors.extend(
                        failed
                            .into_iter()
                            .map(|(pair, reason)| format!("{}: {pair}: {reason}", provider.name())),
                    );
                    observations
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider fetch failed");
                    summary.failed += requested;
                    summary.errors.push(e.to_string());
                    continue;
                }
            };

            debug!(
                provider = provider.name(),
                count = observations.len(),
                "Applying observations"
            );
            match self.cache.put_batch(observations).await {
                Ok(outcome) => summary.absorb(outcome),
                Err(e) => {
                    error!(provider = provider.name(), error = %e, "Failed to persist rates");
                    summary.errors.push(e.to_string());
                }
            }
        }

        summary.elapsed = started.elapsed();
        summary
    }

    /// Spawns the periodic loop. Cycles start every `interval`; ticks missed
    /// while a cycle overruns are skipped.
    pub async fn start(self: &Arc<Self>, interval: Duration) -> Result<JoinHandle<()>, SchedulerError> {
        if self.state().await == SchedulerState::Stopped {
            return Err(SchedulerError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let interval = interval.max(MIN_INTERVAL);
        let scheduler = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        info!(interval_secs = interval.as_secs_f64(), "Starting rate refresh scheduler");

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                let started = Instant::now();
                match scheduler.run_once(SourceFilter::All).await {
                    Ok(_) => {}
                    Err(SchedulerError::Stopped) => break,
                    Err(e) => warn!(error = %e, "Skipping scheduled cycle"),
                }

                let elapsed = started.elapsed();
                if elapsed > interval {
                    warn!(
                        elapsed_secs = elapsed.as_secs_f64(),
                        skipped = (elapsed.as_nanos() / interval.as_nanos()) as u64,
                        "Refresh cycle overran its interval, skipping missed ticks"
                    );
                }
                if *stop_rx.borrow() {
                    break;
                }
            }
            info!("Rate refresh scheduler stopped");
        }))
    }

    /// Requests a stop. An idle scheduler stops at once; a running cycle is
    /// allowed to finish first. Calling it again has no effect.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SchedulerState::Idle => inner.state = SchedulerState::Stopped,
            SchedulerState::Running => inner.stop_requested = true,
            SchedulerState::Stopped => return,
        }
        drop(inner);
        self.stop_tx.send_replace(true);
        debug!("Scheduler stop requested");
    }
}
