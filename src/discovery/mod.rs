//! Discovery of distinct entities in a changing list.
//!
//! Every scan normalizes the visible names, drops keys already surfaced this
//! session and turns the rest into work items. The session set only shrinks on
//! an explicit reset.

mod watch;

pub use watch::{DebounceConfig, ListEvent, run_discovery};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::CacheStore;
use crate::clock::now_ms;
use crate::domain::{EntityDescriptor, WorkItem, normalize_key};
use crate::scheduler::Scheduler;
use crate::sink::ResultSink;

pub struct DiscoverySource {
    cache: Arc<CacheStore>,
    scheduler: Arc<Scheduler>,
    sink: Arc<dyn ResultSink>,
    seen: Mutex<HashSet<String>>,
}

impl DiscoverySource {
    pub fn new(cache: Arc<CacheStore>, scheduler: Arc<Scheduler>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            cache,
            scheduler,
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Surface new keys from the visible descriptors and start work for them.
    ///
    /// Returns the number of newly discovered keys.
    pub fn scan(&self, visible: &[EntityDescriptor]) -> usize {
        let now = now_ms();
        let mut discovered = 0;

        for descriptor in visible {
            let key = normalize_key(&descriptor.name);
            if key.is_empty() {
                log::debug!("Ignoring nameless entry {:?}", descriptor.name);
                continue;
            }
            if !self.seen().insert(key.clone()) {
                continue;
            }
            // Still running from before a reset: leave it unseen so a later scan picks it up
            if self.scheduler.is_pending(&key) {
                log::debug!("Deferring {}: previous item still in flight", key);
                self.seen().remove(&key);
                continue;
            }

            self.sink.on_discovered(&key, &descriptor.metadata);

            let skip_rating_fetch = self
                .cache
                .get(&key)
                .is_some_and(|entry| entry.fresh_rating(now).is_some() && entry.external_ref.is_some());

            if !self
                .scheduler
                .enqueue(WorkItem::new(key.clone(), descriptor.external_id.clone(), skip_rating_fetch))
            {
                log::warn!("Scheduler rejected {}, forgetting it for this scan", key);
                self.seen().remove(&key);
                continue;
            }
            discovered += 1;
        }

        if discovered > 0 {
            log::debug!("Scan surfaced {} new entities", discovered);
            self.scheduler.drain_if_capacity();
        }
        discovered
    }

    /// Forget the session set and drop queued work. The cache is untouched.
    pub fn reset(&self) {
        let forgotten = {
            let mut seen = self.seen();
            let n = seen.len();
            seen.clear();
            n
        };
        self.scheduler.reset();
        log::info!("Discovery reset, {} keys forgotten", forgotten);
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.seen().contains(key)
    }

    /// Keys surfaced this session, sorted.
    pub fn known_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.seen().iter().cloned().collect();
        keys.sort();
        keys
    }
}
