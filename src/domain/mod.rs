//! Domain types for ratelens
//!
//! - CacheEntry / Rating / FinancialSummary: what the cache remembers per entity
//! - EntityDescriptor / WorkItem: what discovery sees and what the scheduler consumes
//! - Progress / ItemPatch / PipelineEvent: what sinks receive
//! - name: key normalization and review links

pub mod entry;
pub mod event;
pub mod name;
pub mod work_item;

pub use entry::{CacheEntry, FinancialSummary, Rating};
pub use event::{ItemPatch, PipelineEvent, Progress};
pub use name::{normalize_key, review_url, search_name};
pub use work_item::{EntityDescriptor, ListingMetadata, WorkItem};
