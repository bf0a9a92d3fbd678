//! Storage layer for ratelens - durable blob persistence for the cache.
//!
//! - `SqliteStore`: one row per key in a local SQLite file
//! - `MemoryStore`: process-local map for tests

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::BlobStore;
