//! Wall-clock helpers for cache expiry
//!
//! Expiry timestamps are persisted, so they use Unix milliseconds rather than
//! monotonic instants.

use std::time::Duration;

/// One day in milliseconds
pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Timestamp `ttl` after `now` (Unix ms), saturating.
pub fn expiry_after(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(ttl.as_millis() as u64)
}
