//! Debounced discovery driven by list change notifications.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::DiscoverySource;
use crate::domain::EntityDescriptor;

/// Notification from the observed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    /// Content changed; carries the currently visible descriptors
    Changed(Vec<EntityDescriptor>),
    /// The view scrolled; carries the currently visible descriptors
    Scrolled(Vec<EntityDescriptor>),
    /// The list was replaced (e.g. navigation); forget the session
    Reset,
}

/// Quiet periods before a burst of notifications triggers a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceConfig {
    pub change_quiet: Duration,
    pub scroll_quiet: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            change_quiet: Duration::from_millis(250),
            scroll_quiet: Duration::from_millis(200),
        }
    }
}

/// Latest batch waiting for its quiet period to elapse.
struct Pending {
    deadline: Instant,
    visible: Vec<EntityDescriptor>,
}

async fn sleep_until_opt(pending: &Option<Pending>) {
    match pending {
        Some(p) => tokio::time::sleep_until(p.deadline).await,
        None => std::future::pending().await,
    }
}

/// Run discovery until the notification channel closes.
///
/// `initial` is scanned immediately. Pending batches are flushed when the channel
/// closes. Returns the number of keys discovered.
pub async fn run_discovery(
    source: Arc<DiscoverySource>,
    initial: Vec<EntityDescriptor>,
    mut rx: mpsc::Receiver<ListEvent>,
    config: DebounceConfig,
) -> usize {
    let mut discovered = source.scan(&initial);
    let mut change: Option<Pending> = None;
    let mut scroll: Option<Pending> = None;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ListEvent::Changed(visible)) => {
                    change = Some(Pending { deadline: Instant::now() + config.change_quiet, visible });
                }
                Some(ListEvent::Scrolled(visible)) => {
                    scroll = Some(Pending { deadline: Instant::now() + config.scroll_quiet, visible });
                }
                Some(ListEvent::Reset) => {
                    change = None;
                    scroll = None;
                    source.reset();
                }
                None => break,
            },
            _ = sleep_until_opt(&change), if change.is_some() => {
                if let Some(p) = change.take() {
                    discovered += source.scan(&p.visible);
                }
            }
            _ = sleep_until_opt(&scroll), if scroll.is_some() => {
                if let Some(p) = scroll.take() {
                    discovered += source.scan(&p.visible);
                }
            }
        }
    }

    for p in [change, scroll].into_iter().flatten() {
        discovered += source.scan(&p.visible);
    }
    log::debug!("Discovery stopped after {} keys", discovered);
    discovered
}
