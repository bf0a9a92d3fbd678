//! Storage trait definitions.

use crate::error::Result;

/// Durable key-value storage for opaque blobs.
///
/// Implementations must survive process restarts (except the in-memory store,
/// which exists for tests) and be safe to share across tasks.
pub trait BlobStore: Send + Sync {
    /// Write (or overwrite) the blob stored under `key`.
    fn persist(&self, key: &str, blob: &[u8]) -> Result<()>;

    /// Read the blob stored under `key`.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// All keys currently stored.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete one key. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Delete everything.
    fn clear(&self) -> Result<()>;
}
