//! Backoff state shared by every rating call.
//!
//! When upstream answers with a forbidden/rate-limited status, all callers must
//! back off together rather than each hammering it on their own schedule.

use std::time::Duration;

use tokio::time::Instant;

/// Longest backoff exponent: 2^6 = 64 seconds.
const MAX_BACKOFF_EXPONENT: u32 = 6;

#[derive(Debug)]
pub struct BackoffState {
    /// When calls may resume (None = no active backoff).
    pub backoff_until: Option<Instant>,
    /// Number of consecutive forbidden responses.
    pub consecutive_hits: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            backoff_until: None,
            consecutive_hits: 0,
        }
    }

    /// Remaining wait, if a backoff is active.
    pub fn remaining(&self) -> Option<Duration> {
        self.backoff_until.and_then(|until| {
            let now = Instant::now();
            if now < until { Some(until - now) } else { None }
        })
    }

    /// Record a forbidden response.
    ///
    /// The delay is 2^consecutive_hits seconds, capped at 64s.
    pub fn record_forbidden(&mut self) -> Duration {
        self.consecutive_hits += 1;

        let delay = Duration::from_secs(2u64.pow(self.consecutive_hits.min(MAX_BACKOFF_EXPONENT)));
        self.backoff_until = Some(Instant::now() + delay);

        tracing::warn!(
            backoff_secs = delay.as_secs(),
            consecutive_hits = self.consecutive_hits,
            "Upstream refused request, backing off globally"
        );
        delay
    }

    /// Record a successful call: clears the backoff and the hit counter.
    pub fn record_success(&mut self) {
        self.consecutive_hits = 0;
        self.backoff_until = None;
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}
