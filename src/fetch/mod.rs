//! Remote lookups and the pacing around them
//!
//! - `source`: the `EnrichmentSource` capability and `FetchError`
//! - `limiter`: jitter, batch pauses, backoff and timeouts
//! - `http`: reqwest-backed source
//! - `mock`: scripted source for tests

mod backoff;
mod http;
mod limiter;
mod mock;
mod parse;
mod source;

pub use backoff::BackoffState;
pub use http::{EndpointConfig, HttpSource, classify_status, fill_template};
pub use limiter::{PacingConfig, PacingStats, RateLimitedClient};
pub use mock::{DEFAULT_MOCK_SCORE, MockSource, rating_page};
pub use parse::{parse_external_ref, parse_financial_report, parse_rating};
pub use source::{EnrichmentSource, FailureKind, FetchError, YearlyReport, latest_summary};
