//! ratelens - employer rating enrichment
//!
//! Enriches a changing list of employer names with a public review rating and a
//! financial summary. Lookups go through a bounded, jittered and batch-throttled
//! scheduler backed by a persistent TTL cache; failed lookups are retried by a
//! periodic sweeper.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod sink;
pub mod storage;

pub use error::{EnrichError, Result};
pub use pipeline::{Pipeline, PipelineConfig};
