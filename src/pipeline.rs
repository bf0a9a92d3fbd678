//! Pipeline facade: one enrichment session with injected storage, source and sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{CacheStore, DEFAULT_TTL};
use crate::discovery::{DebounceConfig, DiscoverySource, ListEvent, run_discovery};
use crate::domain::{EntityDescriptor, Progress, normalize_key};
use crate::error::Result;
use crate::fetch::{EnrichmentSource, PacingConfig, RateLimitedClient};
use crate::scheduler::{RetrySweeper, Scheduler, SchedulerConfig, SweeperConfig};
use crate::sink::ResultSink;
use crate::storage::BlobStore;

/// Everything tunable about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub scheduler: SchedulerConfig,
    pub pacing: PacingConfig,
    pub sweeper: SweeperConfig,
    pub debounce: DebounceConfig,
    /// Lifetime of a written rating
    pub ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            pacing: PacingConfig::default(),
            sweeper: SweeperConfig::default(),
            debounce: DebounceConfig::default(),
            ttl: DEFAULT_TTL,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<CacheStore>,
    client: Arc<RateLimitedClient>,
    scheduler: Arc<Scheduler>,
    discovery: Arc<DiscoverySource>,
    sweeper: Arc<RetrySweeper>,
}

impl Pipeline {
    /// Wire up a session. Loads the cache from `store`.
    pub fn new(
        store: Arc<dyn BlobStore>,
        source: Arc<dyn EnrichmentSource>,
        sink: Arc<dyn ResultSink>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let cache = Arc::new(CacheStore::open(store, config.ttl)?);
        let client = Arc::new(RateLimitedClient::new(source, config.pacing.clone()));
        let scheduler = Arc::new(Scheduler::new(
            config.scheduler.clone(),
            cache.clone(),
            client.clone(),
            sink.clone(),
        ));
        let discovery = Arc::new(DiscoverySource::new(cache.clone(), scheduler.clone(), sink));
        let sweeper = Arc::new(RetrySweeper::new(
            config.sweeper.clone(),
            cache.clone(),
            scheduler.clone(),
            discovery.clone(),
        ));

        log::info!(
            "Pipeline ready: {} cached entries, concurrency {}",
            cache.len(),
            config.scheduler.concurrency
        );

        Ok(Self {
            config,
            cache,
            client,
            scheduler,
            discovery,
            sweeper,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<RateLimitedClient> {
        &self.client
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn discovery(&self) -> &Arc<DiscoverySource> {
        &self.discovery
    }

    pub fn sweeper(&self) -> &Arc<RetrySweeper> {
        &self.sweeper
    }

    /// Surface the visible descriptors. Returns the number of new keys.
    pub fn scan(&self, visible: &[EntityDescriptor]) -> usize {
        self.discovery.scan(visible)
    }

    /// Forget the session and drop queued work.
    pub fn reset(&self) {
        self.discovery.reset();
    }

    /// Force a fresh rating fetch for a raw name. Returns false if already pending.
    pub fn retry(&self, name: &str) -> Result<bool> {
        let queued = self.sweeper.retry(&normalize_key(name))?;
        if queued {
            self.scheduler.drain_if_capacity();
        }
        Ok(queued)
    }

    /// Run one retry sweep now.
    pub fn sweep(&self) -> usize {
        let requeued = self.sweeper.sweep_once();
        if requeued > 0 {
            self.scheduler.drain_if_capacity();
        }
        requeued
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    pub fn progress(&self) -> Progress {
        self.scheduler.progress()
    }

    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Start the periodic retry sweeper.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        tokio::spawn(self.sweeper.clone().run())
    }

    /// Start debounced discovery fed by `rx`, scanning `initial` right away.
    pub fn spawn_discovery(&self, initial: Vec<EntityDescriptor>, rx: mpsc::Receiver<ListEvent>) -> JoinHandle<usize> {
        tokio::spawn(run_discovery(
            self.discovery.clone(),
            initial,
            rx,
            self.config.debounce.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Rating;
    use crate::fetch::MockSource;
    use crate::sink::NullSink;
    use crate::storage::MemoryStore;

    fn pipeline(source: Arc<MockSource>) -> Pipeline {
        let config = PipelineConfig {
            pacing: PacingConfig::immediate(),
            ..PipelineConfig::default()
        };
        Pipeline::new(Arc::new(MemoryStore::new()), source, Arc::new(NullSink), config).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.scheduler.concurrency, 3);
        assert_eq!(config.ttl, Duration::from_secs(7 * 24 * 60 * 60));
    }

    #[tokio::test]
    async fn test_scan_and_wait() {
        let source = Arc::new(MockSource::new().with_rating("Acme", 4.2));
        let pipeline = pipeline(source.clone());

        assert_eq!(pipeline.scan(&[EntityDescriptor::new("Acme (HQ)")]), 1);
        pipeline.wait_idle().await;

        assert_eq!(pipeline.progress(), Progress { completed: 1, total: 1 });
        assert_eq!(pipeline.cache().fresh_rating("Acme"), Some(Rating::Score(4.2)));
    }

    #[tokio::test]
    async fn test_retry_by_raw_name() {
        let source = Arc::new(MockSource::new());
        let pipeline = pipeline(source.clone());
        pipeline.scan(&[EntityDescriptor::new("Acme")]);
        pipeline.wait_idle().await;

        assert!(pipeline.retry("Acme (Seoul)").unwrap());
        pipeline.wait_idle().await;
        assert_eq!(source.rating_calls("Acme"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_discovery() {
        let source = Arc::new(MockSource::new());
        let pipeline = pipeline(source.clone());
        let (tx, rx) = mpsc::channel(4);

        let handle = pipeline.spawn_discovery(vec![EntityDescriptor::new("Acme")], rx);
        tx.send(ListEvent::Changed(vec![EntityDescriptor::new("Beta")])).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
        pipeline.wait_idle().await;
        assert_eq!(source.total_rating_calls(), 2);
    }
}
