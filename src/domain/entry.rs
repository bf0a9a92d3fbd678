//! Cache entry types: ratings, sentinels and financial summaries.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::expiry_after;
use crate::fetch::FailureKind;

/// Outcome of a rating lookup.
///
/// Non-numeric outcomes are sentinels. Each sentinel has a stable numeric code
/// for consumers that only deal in numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Rating {
    /// An actual review score
    Score(f64),
    /// The entity has no review presence
    NotFound,
    /// Upstream refused the request (rate limited or blocked)
    Forbidden,
    /// Transport, parse or internal failure
    Unknown,
}

impl Rating {
    pub const UNKNOWN_CODE: f64 = -1.0;
    pub const NOT_FOUND_CODE: f64 = -2.0;
    pub const FORBIDDEN_CODE: f64 = -3.0;

    /// Sentinel recorded for a failed lookup of the given kind.
    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::NotFound => Rating::NotFound,
            FailureKind::Forbidden => Rating::Forbidden,
            FailureKind::Network | FailureKind::Parse => Rating::Unknown,
        }
    }

    /// Numeric code: the score itself, or a negative sentinel code.
    pub fn code(&self) -> f64 {
        match self {
            Rating::Score(score) => *score,
            Rating::NotFound => Self::NOT_FOUND_CODE,
            Rating::Forbidden => Self::FORBIDDEN_CODE,
            Rating::Unknown => Self::UNKNOWN_CODE,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Rating::Score(score) => Some(*score),
            _ => None,
        }
    }

    /// Whether a later attempt may produce a different answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Rating::Forbidden | Rating::Unknown)
    }

    /// Stable outcomes can be served from cache until they expire.
    pub fn is_stable(&self) -> bool {
        !self.is_retryable()
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Score(score) => write!(f, "{:.1}", score),
            Rating::NotFound => write!(f, "not found"),
            Rating::Forbidden => write!(f, "blocked"),
            Rating::Unknown => write!(f, "unavailable"),
        }
    }
}

/// Most recent yearly figures for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    /// Reporting period, e.g. "2024"
    pub period_label: String,
    pub revenue: i64,
    pub operating_income: i64,
    pub net_income: i64,
}

/// One cached record per entity key.
///
/// Rating, external ref and financials arrive independently; only the rating
/// carries an expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized entity name
    pub key: String,
    /// Last written rating or sentinel (None = never written)
    pub rating: Option<Rating>,
    /// Hashed registration id used for the financial lookup
    pub external_ref: Option<String>,
    pub financial: Option<FinancialSummary>,
    /// When the rating stops being fresh (Unix ms)
    pub expires_at: Option<u64>,
    /// Last mutation (Unix ms)
    pub updated_at: u64,
}

impl CacheEntry {
    /// Create an empty entry for a key
    pub fn new(key: impl Into<String>, now: u64) -> Self {
        Self {
            key: key.into(),
            rating: None,
            external_ref: None,
            financial: None,
            expires_at: None,
            updated_at: now,
        }
    }

    /// True when the rating expiry has passed or was never set.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(true)
    }

    /// Rating that may be served without a remote call.
    ///
    /// Only stable outcomes (scores and not-found) that have not expired count.
    pub fn fresh_rating(&self, now: u64) -> Option<Rating> {
        match self.rating {
            Some(rating) if rating.is_stable() && !self.is_expired(now) => Some(rating),
            _ => None,
        }
    }

    /// Whether a retryable failure is the last thing written for this entry.
    pub fn needs_retry(&self) -> bool {
        self.rating.is_some_and(|r| r.is_retryable())
    }

    /// Record a rating result with a fresh expiry.
    pub fn set_rating(&mut self, rating: Rating, now: u64, ttl: Duration) {
        self.rating = Some(rating);
        self.expires_at = Some(expiry_after(now, ttl));
        self.updated_at = now;
    }

    pub fn set_external_ref(&mut self, reference: impl Into<String>, now: u64) {
        self.external_ref = Some(reference.into());
        self.updated_at = now;
    }

    pub fn set_financial(&mut self, summary: FinancialSummary, now: u64) {
        self.financial = Some(summary);
        self.updated_at = now;
    }

    /// Expire the rating immediately, keeping every other field.
    pub fn force_expire(&mut self, now: u64) {
        self.expires_at = Some(0);
        self.updated_at = now;
    }
}
