//! TTL cache of enrichment results
//!
//! One [`CacheEntry`] per entity key, written through to a [`BlobStore`] as a JSON
//! blob after every mutation. The in-memory map is the read path; storage is only
//! read once at open.
//!
//! Every read-modify-write runs under the map mutex with no await point inside,
//! so concurrent item tasks never lose each other's fields. Async callers use the
//! `write_*` forms, which run that write on the blocking pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::{DAY_MS, now_ms};
use crate::domain::{CacheEntry, FinancialSummary, Rating};
use crate::error::{EnrichError, Result};
use crate::storage::BlobStore;

/// Default rating lifetime: 7 days
pub const DEFAULT_TTL: Duration = Duration::from_millis(7 * DAY_MS);

pub struct CacheStore {
    store: Arc<dyn BlobStore>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl CacheStore {
    /// Load every entry from storage.
    ///
    /// Undecodable blobs are skipped with a warning rather than failing the open.
    pub fn open(store: Arc<dyn BlobStore>, ttl: Duration) -> Result<Self> {
        let mut entries = HashMap::new();
        for key in store.keys()? {
            let Some(blob) = store.load(&key)? else {
                continue;
            };
            match serde_json::from_slice::<CacheEntry>(&blob) {
                Ok(entry) => {
                    entries.insert(key, entry);
                }
                Err(e) => log::warn!("Skipping unreadable cache record {}: {}", key, e),
            }
        }
        log::debug!("Cache opened with {} entries", entries.len());

        Ok(Self {
            store,
            entries: Mutex::new(entries),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::warn!("Cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rating that can be served without a remote call right now.
    pub fn fresh_rating(&self, key: &str) -> Option<Rating> {
        self.fresh_rating_at(key, now_ms())
    }

    pub fn fresh_rating_at(&self, key: &str, now: u64) -> Option<Rating> {
        self.entries().get(key).and_then(|e| e.fresh_rating(now))
    }

    /// Mutate the entry for `key` (creating it if needed) and persist it.
    ///
    /// The map is only updated when the write to storage succeeds.
    pub fn update<F>(&self, key: &str, mutate: F) -> Result<CacheEntry>
    where
        F: FnOnce(&mut CacheEntry, u64),
    {
        let now = now_ms();
        let mut entries = self.entries();

        let mut entry = entries.get(key).cloned().unwrap_or_else(|| CacheEntry::new(key, now));
        mutate(&mut entry, now);

        let blob = serde_json::to_vec(&entry).map_err(|e| EnrichError::Cache(format!("encode {}: {}", key, e)))?;
        self.store.persist(key, &blob)?;

        entries.insert(key.to_string(), entry.clone());
        Ok(entry)
    }

    /// Write a rating or sentinel with a fresh expiry.
    pub fn record_rating(&self, key: &str, rating: Rating) -> Result<CacheEntry> {
        let ttl = self.ttl;
        self.update(key, |entry, now| entry.set_rating(rating, now, ttl))
    }

    pub fn record_external_ref(&self, key: &str, reference: &str) -> Result<CacheEntry> {
        self.update(key, |entry, now| entry.set_external_ref(reference, now))
    }

    pub fn record_financials(&self, key: &str, summary: FinancialSummary) -> Result<CacheEntry> {
        self.update(key, |entry, now| entry.set_financial(summary, now))
    }

    /// [`record_rating`](Self::record_rating) on the blocking pool.
    pub async fn write_rating(self: &Arc<Self>, key: &str, rating: Rating) -> Result<CacheEntry> {
        let key = key.to_string();
        self.write_blocking(move |cache| cache.record_rating(&key, rating)).await
    }

    pub async fn write_external_ref(self: &Arc<Self>, key: &str, reference: &str) -> Result<CacheEntry> {
        let key = key.to_string();
        let reference = reference.to_string();
        self.write_blocking(move |cache| cache.record_external_ref(&key, &reference))
            .await
    }

    pub async fn write_financials(self: &Arc<Self>, key: &str, summary: FinancialSummary) -> Result<CacheEntry> {
        let key = key.to_string();
        self.write_blocking(move |cache| cache.record_financials(&key, summary))
            .await
    }

    async fn write_blocking<F>(self: &Arc<Self>, write: F) -> Result<CacheEntry>
    where
        F: FnOnce(&CacheStore) -> Result<CacheEntry> + Send + 'static,
    {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || write(&cache))
            .await
            .map_err(|e| EnrichError::Storage(format!("cache write task failed: {}", e)))?
    }

    /// Expire the rating of an existing entry. Returns false when the key is unknown.
    pub fn force_expire(&self, key: &str) -> Result<bool> {
        if !self.entries().contains_key(key) {
            return Ok(false);
        }
        self.update(key, |entry, now| entry.force_expire(now))?;
        Ok(true)
    }

    /// All entries, ordered by key.
    pub fn entries_sorted(&self) -> Vec<CacheEntry> {
        let mut all: Vec<CacheEntry> = self.entries().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries().clone()
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries();
        self.store.remove(key)?;
        Ok(entries.remove(key).is_some())
    }

    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries();
        self.store.clear()?;
        entries.clear();
        log::info!("Cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    struct FailingStore;

    impl BlobStore for FailingStore {
        fn persist(&self, _key: &str, _blob: &[u8]) -> Result<()> {
            Err(EnrichError::Storage("disk full".to_string()))
        }
        fn load(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        fn keys(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Remembers which thread each write ran on.
    #[derive(Default)]
    struct ThreadStore {
        inner: MemoryStore,
        writers: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl BlobStore for ThreadStore {
        fn persist(&self, key: &str, blob: &[u8]) -> Result<()> {
            self.writers.lock().unwrap().push(std::thread::current().id());
            self.inner.persist(key, blob)
        }
        fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.load(key)
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }

    fn summary() -> FinancialSummary {
        FinancialSummary {
            period_label: "2024".to_string(),
            revenue: 1_000,
            operating_income: 100,
            net_income: 50,
        }
    }

    fn open(store: Arc<dyn BlobStore>) -> CacheStore {
        CacheStore::open(store, DEFAULT_TTL).unwrap()
    }

    #[test]
    fn test_record_rating_is_fresh() {
        let cache = open(Arc::new(MemoryStore::new()));
        cache.record_rating("Acme", Rating::Score(4.2)).unwrap();

        assert_eq!(cache.fresh_rating("Acme"), Some(Rating::Score(4.2)));
        let entry = cache.get("Acme").unwrap();
        assert!(entry.expires_at.unwrap() >= now_ms() + 7 * DAY_MS - 1_000);
    }

    #[test]
    fn test_fields_arrive_independently() {
        let cache = open(Arc::new(MemoryStore::new()));
        cache.record_external_ref("Acme", "hash-1").unwrap();
        cache.record_financials("Acme", summary()).unwrap();
        cache.record_rating("Acme", Rating::NotFound).unwrap();

        let entry = cache.get("Acme").unwrap();
        assert_eq!(entry.external_ref.as_deref(), Some("hash-1"));
        assert_eq!(entry.financial, Some(summary()));
        assert_eq!(entry.rating, Some(Rating::NotFound));
    }

    #[test]
    fn test_persist_and_reload_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let cache = open(store.clone());
        cache.record_rating("Acme", Rating::Score(4.2)).unwrap();
        cache.record_financials("Acme", summary()).unwrap();
        cache.record_rating("Beta", Rating::Forbidden).unwrap();

        let reloaded = open(store);
        assert_eq!(reloaded.snapshot(), cache.snapshot());
    }

    #[test]
    fn test_open_skips_corrupt_blob() {
        let store = Arc::new(MemoryStore::new());
        store.persist("Broken", b"not json").unwrap();
        open(store.clone()).record_rating("Acme", Rating::Score(3.0)).unwrap();

        let cache = open(store);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("Broken").is_none());
    }

    #[test]
    fn test_failed_persist_leaves_map_untouched() {
        let cache = CacheStore::open(Arc::new(FailingStore), DEFAULT_TTL).unwrap();
        let err = cache.record_rating("Acme", Rating::Score(4.0)).unwrap_err();

        assert!(matches!(err, EnrichError::Storage(_)));
        assert!(cache.get("Acme").is_none());
    }

    #[tokio::test]
    async fn test_async_writes_leave_runtime_thread() {
        let store = Arc::new(ThreadStore::default());
        let cache = Arc::new(open(store.clone()));

        cache.write_rating("Acme", Rating::Score(4.2)).await.unwrap();
        cache.write_external_ref("Acme", "hash-1").await.unwrap();
        cache.write_financials("Acme", summary()).await.unwrap();

        let runtime_thread = std::thread::current().id();
        let writers = store.writers.lock().unwrap().clone();
        assert_eq!(writers.len(), 3);
        assert!(writers.iter().all(|id| *id != runtime_thread));

        let entry = cache.get("Acme").unwrap();
        assert_eq!(entry.rating, Some(Rating::Score(4.2)));
        assert_eq!(entry.external_ref.as_deref(), Some("hash-1"));
        assert_eq!(entry.financial, Some(summary()));
    }

    #[tokio::test]
    async fn test_async_write_failure_is_reported() {
        let cache = Arc::new(CacheStore::open(Arc::new(FailingStore), DEFAULT_TTL).unwrap());
        let err = cache.write_rating("Acme", Rating::Unknown).await.unwrap_err();

        assert!(matches!(err, EnrichError::Storage(_)));
        assert!(cache.get("Acme").is_none());
    }

    #[test]
    fn test_force_expire() {
        let cache = open(Arc::new(MemoryStore::new()));
        cache.record_rating("Acme", Rating::Score(4.2)).unwrap();

        assert!(cache.force_expire("Acme").unwrap());
        assert!(cache.fresh_rating("Acme").is_none());
        assert_eq!(cache.get("Acme").unwrap().rating, Some(Rating::Score(4.2)));
        assert!(!cache.force_expire("Missing").unwrap());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = Arc::new(MemoryStore::new());
        let cache = open(store.clone());
        cache.record_rating("Acme", Rating::Score(4.2)).unwrap();
        cache.record_rating("Beta", Rating::Unknown).unwrap();

        assert!(cache.remove("Acme").unwrap());
        assert!(!cache.remove("Acme").unwrap());
        assert_eq!(store.len(), 1);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_entries_sorted_by_key() {
        let cache = open(Arc::new(MemoryStore::new()));
        cache.record_rating("Gamma", Rating::Score(1.0)).unwrap();
        cache.record_rating("Alpha", Rating::Score(2.0)).unwrap();

        let keys: Vec<String> = cache.entries_sorted().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["Alpha", "Gamma"]);
    }
}
