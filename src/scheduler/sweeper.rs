//! Retry sweeper
//!
//! Periodically re-enqueues session keys whose last rating outcome was a
//! retryable sentinel. A key that is queued or in flight is left alone, so two
//! sweeps before the retry completes still produce a single retry.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::manager::Scheduler;
use crate::cache::CacheStore;
use crate::discovery::DiscoverySource;
use crate::domain::WorkItem;
use crate::error::Result;

/// Configuration for the retry sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Interval between sweeps
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Counters across sweeps
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepState {
    /// Sweeps run so far
    pub sweep_count: u64,
    /// Items re-enqueued across all sweeps
    pub total_requeued: u64,
    /// Items re-enqueued by the last sweep
    pub last_requeued: usize,
}

impl SweepState {
    fn record(&mut self, requeued: usize) {
        self.sweep_count += 1;
        self.total_requeued += requeued as u64;
        self.last_requeued = requeued;
    }
}

pub struct RetrySweeper {
    config: SweeperConfig,
    cache: Arc<CacheStore>,
    scheduler: Arc<Scheduler>,
    discovery: Arc<DiscoverySource>,
    state: Mutex<SweepState>,
}

impl RetrySweeper {
    pub fn new(
        config: SweeperConfig,
        cache: Arc<CacheStore>,
        scheduler: Arc<Scheduler>,
        discovery: Arc<DiscoverySource>,
    ) -> Self {
        Self {
            config,
            cache,
            scheduler,
            discovery,
            state: Mutex::new(SweepState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SweepState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn stats(&self) -> SweepState {
        self.state().clone()
    }

    /// Force a fresh rating fetch for one key.
    ///
    /// Returns false when the key is already pending.
    pub fn retry(&self, key: &str) -> Result<bool> {
        if self.scheduler.is_pending(key) {
            return Ok(false);
        }
        self.cache.force_expire(key)?;
        Ok(self.scheduler.enqueue(WorkItem::refresh(key)))
    }

    /// Run one sweep over the session's keys. Returns how many were re-enqueued.
    pub fn sweep_once(&self) -> usize {
        let mut requeued = 0;

        for key in self.discovery.known_keys() {
            let needs_retry = self.cache.get(&key).is_some_and(|entry| entry.needs_retry());
            if !needs_retry {
                continue;
            }
            match self.retry(&key) {
                Ok(true) => {
                    log::debug!("Retrying {}", key);
                    requeued += 1;
                }
                Ok(false) => {}
                Err(e) => log::warn!("Could not schedule retry for {}: {}", key, e),
            }
        }

        self.state().record(requeued);
        if requeued > 0 {
            log::info!("Sweep re-enqueued {} entities", requeued);
        }
        requeued
    }

    /// Sweep on a fixed interval, forever. The first sweep happens one interval in.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.sweep_once() > 0 {
                self.scheduler.drain_if_capacity();
            }
        }
    }
}
