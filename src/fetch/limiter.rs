//! Rate-limited fetch client.
//!
//! Wraps an [`EnrichmentSource`] with the pacing the review site tolerates:
//! - a jittered delay before every rating call
//! - a longer batch pause before every `batch_size`-th call after the first batch,
//!   which holds back every caller, not just the one that drew the boundary
//! - a global exponential backoff after forbidden responses
//! - a per-request timeout that surfaces as a network failure
//!
//! Secondary lookups (external ref, financials) only get the timeout.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use super::backoff::BackoffState;
use super::parse::parse_rating;
use super::source::{EnrichmentSource, FetchError, YearlyReport, latest_summary};
use crate::domain::FinancialSummary;

/// Pacing policy for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Calls per batch before a batch pause
    pub batch_size: u64,
    pub batch_pause: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            jitter_min: Duration::from_millis(200),
            jitter_max: Duration::from_millis(600),
            batch_size: 30,
            batch_pause: Duration::from_millis(3000),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl PacingConfig {
    /// Draw a delay uniformly from `[jitter_min, jitter_max]`.
    pub fn next_jitter(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Whether the call with zero-based sequence number `seq` is preceded by a batch pause.
    pub fn pauses_before(&self, seq: u64) -> bool {
        self.batch_size > 0 && seq > 0 && seq % self.batch_size == 0
    }

    /// Same policy without any waiting, for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            batch_pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Counters describing how much pacing has happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacingStats {
    /// Rating calls issued to the source
    pub rating_calls: u64,
    /// Batch pauses taken
    pub batch_pauses: u64,
    /// Forbidden responses seen
    pub forbidden: u64,
}

/// Call numbering and the batch pause, updated together so no caller can
/// draw a number past a batch boundary without seeing its pause.
#[derive(Debug, Default)]
struct BatchGate {
    issued: u64,
    pause_until: Option<Instant>,
}

impl BatchGate {
    fn remaining(&self) -> Option<Duration> {
        self.pause_until.and_then(|until| {
            let now = Instant::now();
            if now < until { Some(until - now) } else { None }
        })
    }
}

pub struct RateLimitedClient {
    source: Arc<dyn EnrichmentSource>,
    config: PacingConfig,
    gate: Mutex<BatchGate>,
    batch_pauses: AtomicU64,
    forbidden: AtomicU64,
    backoff: Mutex<BackoffState>,
}

impl RateLimitedClient {
    pub fn new(source: Arc<dyn EnrichmentSource>, config: PacingConfig) -> Self {
        Self {
            source,
            config,
            gate: Mutex::new(BatchGate::default()),
            batch_pauses: AtomicU64::new(0),
            forbidden: AtomicU64::new(0),
            backoff: Mutex::new(BackoffState::new()),
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    pub fn stats(&self) -> PacingStats {
        PacingStats {
            rating_calls: self.gate().issued,
            batch_pauses: self.batch_pauses.load(Ordering::SeqCst),
            forbidden: self.forbidden.load(Ordering::SeqCst),
        }
    }

    fn gate(&self) -> MutexGuard<'_, BatchGate> {
        self.gate.lock().unwrap_or_else(|poisoned| {
            log::warn!("Batch gate mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn backoff(&self) -> MutexGuard<'_, BackoffState> {
        self.backoff.lock().unwrap_or_else(|poisoned| {
            log::warn!("Backoff state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Paced rating lookup for a search name.
    pub async fn fetch_rating(&self, name: &str) -> Result<f64, FetchError> {
        tokio::time::sleep(self.config.next_jitter()).await;

        self.admit();

        // Batch pause and forbidden backoff both hold every caller
        loop {
            let pause = self.gate().remaining();
            let wait = pause.or_else(|| self.backoff().remaining());
            match wait {
                Some(wait) => {
                    log::debug!("Waiting {:?} before fetching {}", wait, name);
                    tokio::time::sleep(wait).await;
                }
                None => break,
            }
        }

        let result = self
            .with_timeout(self.source.fetch_rating_page(name))
            .await
            .and_then(|page| parse_rating(&page));

        match &result {
            Ok(_) => self.backoff().record_success(),
            Err(e) if e.is_forbidden() => {
                self.forbidden.fetch_add(1, Ordering::SeqCst);
                self.backoff().record_forbidden();
            }
            Err(_) => {}
        }

        result
    }

    /// Take the next call number, opening a batch pause when it crosses a boundary.
    fn admit(&self) {
        let mut gate = self.gate();
        let seq = gate.issued;
        gate.issued += 1;
        if self.config.pauses_before(seq) {
            self.batch_pauses.fetch_add(1, Ordering::SeqCst);
            log::info!(
                "Batch pause of {:?} before rating call #{}",
                self.config.batch_pause,
                seq + 1
            );
            gate.pause_until = Some(Instant::now() + self.config.batch_pause);
        }
    }

    /// Resolve a listing id to the hashed registration id.
    pub async fn fetch_external_ref(&self, entity_id: &str) -> Result<String, FetchError> {
        self.with_timeout(self.source.fetch_external_id(entity_id)).await
    }

    /// Latest financial summary for a hashed registration id.
    pub async fn fetch_financials(&self, reference: &str) -> Result<FinancialSummary, FetchError> {
        let reports: Vec<YearlyReport> = self.with_timeout(self.source.fetch_financial_report(reference)).await?;
        latest_summary(&reports).ok_or_else(|| FetchError::NotFound(format!("no financial years for {}", reference)))
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T, FetchError>>) -> Result<T, FetchError> {
        match tokio::time::timeout(self.config.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.config.fetch_timeout)),
        }
    }
}
