//! Bounded-concurrency scheduler.
//!
//! Items start in FIFO order, at most `concurrency` at a time, and never two for
//! the same key. Each item resolves its rating cache-first, falls back to the
//! rate-limited client, writes the outcome to the cache and reports to the sink.
//! Items that carry an external id also start an independent secondary chain
//! (external ref, then financials) that never affects the rating path.
//!
//! Slots are released by a drop guard, so a panicking item still frees its slot,
//! counts as completed and lets the queue drain.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;

use super::queue::WorkQueue;
use crate::cache::CacheStore;
use crate::domain::{ItemPatch, Progress, Rating, WorkItem, search_name};
use crate::error::Result;
use crate::fetch::{FailureKind, FetchError, RateLimitedClient};
use crate::sink::ResultSink;

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum items in flight
    pub concurrency: usize,
    /// How long a slot stays held after an unexpected item error
    pub error_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            error_cooldown: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_error_cooldown(mut self, cooldown: Duration) -> Self {
        self.error_cooldown = cooldown;
        self
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: WorkQueue,
    in_flight: HashSet<String>,
    /// Secondary chains still running
    secondary: usize,
    completed: u64,
    total: u64,
    paused: bool,
    /// Bumped by reset; completions from older generations are not counted
    generation: u64,
    peak_in_flight: usize,
}

impl SchedulerState {
    fn progress(&self) -> Progress {
        Progress {
            completed: self.completed,
            total: self.total,
        }
    }

    /// Nothing running and nothing that will start on its own.
    fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.secondary == 0 && (self.queue.is_empty() || self.paused)
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    cache: Arc<CacheStore>,
    client: Arc<RateLimitedClient>,
    sink: Arc<dyn ResultSink>,
    state: Mutex<SchedulerState>,
    idle: Notify,
}

/// Holds an in-flight slot for the lifetime of one item task.
struct SlotGuard {
    scheduler: Arc<Scheduler>,
    key: String,
    generation: u64,
    counted: bool,
}

impl SlotGuard {
    fn complete(&mut self) {
        if !self.counted {
            self.counted = true;
            self.scheduler.mark_completed(self.generation);
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.counted {
            log::error!("Item {} ended without completing, releasing its slot", self.key);
            self.complete();
        }
        self.scheduler.release(&self.key);
    }
}

/// Tracks one running secondary chain.
struct SecondaryGuard {
    scheduler: Arc<Scheduler>,
}

impl Drop for SecondaryGuard {
    fn drop(&mut self) {
        let idle = {
            let mut state = self.scheduler.state();
            state.secondary = state.secondary.saturating_sub(1);
            state.is_idle()
        };
        if idle {
            self.scheduler.idle.notify_waiters();
        }
    }
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        cache: Arc<CacheStore>,
        client: Arc<RateLimitedClient>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            config,
            cache,
            client,
            sink,
            state: Mutex::new(SchedulerState::default()),
            idle: Notify::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("Scheduler mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Queue an item. Returns false when its key is already queued or in flight.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        let progress = {
            let mut state = self.state();
            if state.in_flight.contains(&item.key) || state.queue.contains(&item.key) {
                log::debug!("Skipping {}: already pending", item.key);
                return false;
            }
            state.queue.push(item);
            state.total += 1;
            state.progress()
        };
        self.sink.on_progress(progress);
        true
    }

    /// Start queued items until the concurrency cap is reached.
    ///
    /// Returns the number of items started. Must be called within a tokio runtime;
    /// outside one nothing is started.
    pub fn drain_if_capacity(self: &Arc<Self>) -> usize {
        if Handle::try_current().is_err() {
            log::warn!("drain_if_capacity called outside a runtime, nothing started");
            return 0;
        }

        let mut started = 0;
        loop {
            let (item, generation) = {
                let mut state = self.state();
                if state.paused || state.in_flight.len() >= self.config.concurrency {
                    break;
                }
                let Some(item) = state.queue.pop() else {
                    break;
                };
                state.in_flight.insert(item.key.clone());
                state.peak_in_flight = state.peak_in_flight.max(state.in_flight.len());
                (item, state.generation)
            };

            log::debug!("Starting {}", item.key);
            let guard = SlotGuard {
                scheduler: self.clone(),
                key: item.key.clone(),
                generation,
                counted: false,
            };
            tokio::spawn(Self::run_item(guard, item));
            started += 1;
        }
        started
    }

    async fn run_item(mut guard: SlotGuard, item: WorkItem) {
        let scheduler = guard.scheduler.clone();

        if let Some(external_id) = &item.external_id {
            scheduler.spawn_secondary(item.key.clone(), external_id.clone());
        }

        match scheduler.resolve(&item).await {
            Ok(patch) => {
                if !patch.is_empty() {
                    scheduler.sink.on_item_resolved(&item.key, &patch);
                }
                guard.complete();
            }
            Err(e) => {
                log::error!("Processing {} failed: {}", item.key, e);
                if let Err(e) = scheduler.cache.write_rating(&item.key, Rating::Unknown).await {
                    log::warn!("Could not record failure for {}: {}", item.key, e);
                }
                scheduler.sink.on_item_resolved(&item.key, &ItemPatch::rating(Rating::Unknown));
                guard.complete();
                tokio::time::sleep(scheduler.config.error_cooldown).await;
            }
        }
    }

    /// Rating resolution for one item: skip, cache, or remote.
    async fn resolve(&self, item: &WorkItem) -> Result<ItemPatch> {
        if item.skip_rating_fetch {
            return Ok(self.cache.get(&item.key).map(|e| ItemPatch::from_entry(&e)).unwrap_or_default());
        }

        if let Some(rating) = self.cache.fresh_rating(&item.key) {
            log::debug!("{} served from cache", item.key);
            let mut patch = ItemPatch::rating(rating);
            patch.financial = self.cache.get(&item.key).and_then(|e| e.financial);
            return Ok(patch);
        }

        let rating = match self.client.fetch_rating(&search_name(&item.key)).await {
            Ok(score) => Rating::Score(score),
            Err(e) => {
                log_fetch_failure(&item.key, &e);
                Rating::from_failure(e.kind())
            }
        };

        let entry = self.cache.write_rating(&item.key, rating).await?;
        Ok(ItemPatch::from_entry(&entry))
    }

    fn spawn_secondary(self: &Arc<Self>, key: String, external_id: String) {
        self.state().secondary += 1;
        let guard = SecondaryGuard { scheduler: self.clone() };

        tokio::spawn(async move {
            let scheduler = guard.scheduler.clone();
            if let Err(e) = scheduler.run_secondary(&key, &external_id).await {
                log::warn!("Financial lookup for {} failed: {}", key, e);
            }
            drop(guard);
        });
    }

    async fn run_secondary(&self, key: &str, external_id: &str) -> eyre::Result<()> {
        let cached_ref = self.cache.get(key).and_then(|e| e.external_ref);
        let reference = match cached_ref {
            Some(reference) => reference,
            None => {
                let reference = self.client.fetch_external_ref(external_id).await?;
                self.cache.write_external_ref(key, &reference).await?;
                reference
            }
        };

        let summary = self.client.fetch_financials(&reference).await?;
        self.cache.write_financials(key, summary.clone()).await?;
        self.sink.on_item_resolved(key, &ItemPatch::financial(summary));
        Ok(())
    }

    fn mark_completed(&self, generation: u64) {
        let progress = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.completed += 1;
            state.progress()
        };
        self.sink.on_progress(progress);
    }

    fn release(self: &Arc<Self>, key: &str) {
        self.state().in_flight.remove(key);

        // Runtime may be shutting down while tasks are dropped
        if Handle::try_current().is_ok() {
            self.drain_if_capacity();
        }

        if self.state().is_idle() {
            self.idle.notify_waiters();
        }
    }

    /// Drop queued items and restart the counters.
    ///
    /// In-flight items finish and write their results but no longer count.
    pub fn reset(&self) {
        let dropped = {
            let mut state = self.state();
            let dropped = state.queue.clear();
            state.generation += 1;
            state.completed = 0;
            state.total = 0;
            dropped
        };
        log::info!("Scheduler reset, {} queued items dropped", dropped);
        self.sink.on_progress(Progress::default());
        if self.state().is_idle() {
            self.idle.notify_waiters();
        }
    }

    /// Stop starting new items. In-flight items continue.
    pub fn pause(&self) {
        self.state().paused = true;
        log::info!("Scheduler paused");
        if self.state().is_idle() {
            self.idle.notify_waiters();
        }
    }

    pub fn resume(self: &Arc<Self>) {
        self.state().paused = false;
        log::info!("Scheduler resumed");
        self.drain_if_capacity();
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Whether `key` is queued or in flight.
    pub fn is_pending(&self, key: &str) -> bool {
        let state = self.state();
        state.queue.contains(key) || state.in_flight.contains(key)
    }

    pub fn progress(&self) -> Progress {
        self.state().progress()
    }

    pub fn queued_count(&self) -> usize {
        self.state().queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    /// Highest in-flight count seen so far.
    pub fn peak_in_flight(&self) -> usize {
        self.state().peak_in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.state().is_idle()
    }

    /// Wait until nothing is running and nothing is left to start.
    ///
    /// A paused scheduler with queued items counts as idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

fn log_fetch_failure(key: &str, e: &FetchError) {
    match e.kind() {
        FailureKind::NotFound => log::info!("{}: no review page", key),
        FailureKind::Forbidden => log::warn!("{}: upstream refused request: {}", key, e),
        FailureKind::Network => log::warn!("{}: network failure: {}", key, e),
        FailureKind::Parse => log::error!("{}: could not parse review page, upstream format may have changed: {}", key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::domain::PipelineEvent;
    use crate::error::EnrichError;
    use crate::fetch::{MockSource, PacingConfig};
    use crate::sink::{ChannelSink, NullSink};
    use crate::storage::{BlobStore, MemoryStore};

    fn scheduler_with(
        source: Arc<MockSource>,
        store: Arc<dyn BlobStore>,
        sink: Arc<dyn ResultSink>,
        config: SchedulerConfig,
    ) -> Arc<Scheduler> {
        let cache = Arc::new(CacheStore::open(store, DEFAULT_TTL).unwrap());
        let client = Arc::new(RateLimitedClient::new(source, PacingConfig::immediate()));
        Arc::new(Scheduler::new(config, cache, client, sink))
    }

    fn scheduler(source: Arc<MockSource>) -> Arc<Scheduler> {
        scheduler_with(
            source,
            Arc::new(MemoryStore::new()),
            Arc::new(NullSink),
            SchedulerConfig::default(),
        )
    }

    struct PanickingSink;

    impl ResultSink for PanickingSink {
        fn on_item_resolved(&self, key: &str, _patch: &ItemPatch) {
            panic!("sink exploded on {}", key);
        }
    }

    struct ReadOnlyStore;

    impl BlobStore for ReadOnlyStore {
        fn persist(&self, _key: &str, _blob: &[u8]) -> Result<()> {
            Err(EnrichError::Storage("read-only".to_string()))
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

    #[test]
    fn test_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.error_cooldown, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_pending_key() {
        let scheduler = scheduler(Arc::new(MockSource::new()));
        assert!(scheduler.enqueue(WorkItem::refresh("Acme")));
        assert!(!scheduler.enqueue(WorkItem::refresh("Acme")));
        assert_eq!(scheduler.progress(), Progress { completed: 0, total: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let source = Arc::new(MockSource::new().with_latency(Duration::from_millis(500)));
        let scheduler = scheduler(source.clone());

        for i in 0..10 {
            scheduler.enqueue(WorkItem::refresh(format!("Company {}", i)));
        }
        assert_eq!(scheduler.drain_if_capacity(), 3);
        assert_eq!(scheduler.in_flight_count(), 3);
        assert_eq!(scheduler.queued_count(), 7);

        scheduler.wait_idle().await;

        assert_eq!(scheduler.peak_in_flight(), 3);
        assert!(source.peak_concurrent() <= 3);
        assert_eq!(scheduler.progress(), Progress { completed: 10, total: 10 });
    }

    #[tokio::test]
    async fn test_in_flight_key_not_requeued() {
        let source = Arc::new(MockSource::new().with_latency(Duration::from_millis(50)));
        let scheduler = scheduler(source.clone());

        scheduler.enqueue(WorkItem::refresh("Acme"));
        scheduler.drain_if_capacity();
        assert!(scheduler.is_pending("Acme"));
        assert!(!scheduler.enqueue(WorkItem::refresh("Acme")));

        scheduler.wait_idle().await;
        assert!(!scheduler.is_pending("Acme"));
        assert_eq!(source.rating_calls("Acme"), 1);
    }

    #[tokio::test]
    async fn test_resolution_writes_cache_and_notifies() {
        let source = Arc::new(MockSource::new().with_rating("Acme", 4.2));
        let (sink, mut rx) = ChannelSink::channel();
        let scheduler = scheduler_with(
            source,
            Arc::new(MemoryStore::new()),
            Arc::new(sink),
            SchedulerConfig::default(),
        );

        scheduler.enqueue(WorkItem::refresh("Acme"));
        scheduler.drain_if_capacity();
        scheduler.wait_idle().await;

        assert_eq!(scheduler.cache.fresh_rating("Acme"), Some(Rating::Score(4.2)));

        let mut resolved = vec![];
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::ItemResolved { key, patch } = event {
                resolved.push((key, patch.rating));
            }
        }
        assert_eq!(resolved, vec![("Acme".to_string(), Some(Rating::Score(4.2)))]);
    }

    #[tokio::test]
    async fn test_fetch_failure_becomes_sentinel() {
        let source = Arc::new(MockSource::new().with_failure("Gone", FetchError::NotFound("Gone".into())));
        let scheduler = scheduler(source);

        scheduler.enqueue(WorkItem::refresh("Gone"));
        scheduler.drain_if_capacity();
        scheduler.wait_idle().await;

        assert_eq!(scheduler.cache.get("Gone").unwrap().rating, Some(Rating::NotFound));
        assert_eq!(scheduler.progress(), Progress { completed: 1, total: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_holds_slot_for_cooldown() {
        let scheduler = scheduler_with(
            Arc::new(MockSource::new()),
            Arc::new(ReadOnlyStore),
            Arc::new(NullSink),
            SchedulerConfig::default(),
        );

        let start = tokio::time::Instant::now();
        scheduler.enqueue(WorkItem::refresh("Acme"));
        scheduler.drain_if_capacity();
        scheduler.wait_idle().await;

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(scheduler.progress(), Progress { completed: 1, total: 1 });
    }

    #[tokio::test]
    async fn test_panicking_item_releases_slot() {
        let scheduler = scheduler_with(
            Arc::new(MockSource::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(PanickingSink),
            SchedulerConfig::default().with_concurrency(1),
        );

        scheduler.enqueue(WorkItem::refresh("Acme"));
        scheduler.enqueue(WorkItem::refresh("Beta"));
        scheduler.drain_if_capacity();
        scheduler.wait_idle().await;

        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(scheduler.progress(), Progress { completed: 2, total: 2 });
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let source = Arc::new(MockSource::new());
        let scheduler = scheduler(source.clone());

        scheduler.pause();
        scheduler.enqueue(WorkItem::refresh("Acme"));
        assert_eq!(scheduler.drain_if_capacity(), 0);
        scheduler.wait_idle().await;
        assert_eq!(source.total_rating_calls(), 0);

        scheduler.resume();
        scheduler.wait_idle().await;
        assert_eq!(source.rating_calls("Acme"), 1);
    }

    #[tokio::test]
    async fn test_reset_drops_queue_and_counters() {
        let source = Arc::new(MockSource::new());
        let scheduler = scheduler(source.clone());

        scheduler.pause();
        scheduler.enqueue(WorkItem::refresh("Acme"));
        scheduler.enqueue(WorkItem::refresh("Beta"));
        scheduler.reset();

        assert_eq!(scheduler.queued_count(), 0);
        assert_eq!(scheduler.progress(), Progress::default());

        scheduler.resume();
        scheduler.wait_idle().await;
        assert_eq!(source.total_rating_calls(), 0);
    }

    #[tokio::test]
    async fn test_drain_outside_runtime_starts_nothing() {
        let scheduler = scheduler(Arc::new(MockSource::new()));
        scheduler.enqueue(WorkItem::refresh("Acme"));

        let handle = std::thread::spawn({
            let scheduler = scheduler.clone();
            move || scheduler.drain_if_capacity()
        });
        assert_eq!(handle.join().unwrap(), 0);
        assert_eq!(scheduler.queued_count(), 1);
    }
}
