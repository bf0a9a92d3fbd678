//! In-memory blob store for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::traits::BlobStore;
use crate::error::{EnrichError, Result};

/// Blob store backed by a map; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryStore {
    fn persist(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .map_err(|e| EnrichError::Storage(e.to_string()))?
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .map_err(|e| EnrichError::Storage(e.to_string()))?
            .get(key)
            .cloned())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .map_err(|e| EnrichError::Storage(e.to_string()))?
            .keys()
            .cloned()
            .collect())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.blobs
            .write()
            .map_err(|e| EnrichError::Storage(e.to_string()))?
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.blobs
            .write()
            .map_err(|e| EnrichError::Storage(e.to_string()))?
            .clear();
        Ok(())
    }
}
