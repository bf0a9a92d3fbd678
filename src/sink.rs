//! Result sinks: where the pipeline reports progress and resolved values.

use tokio::sync::mpsc;

use crate::domain::{ItemPatch, ListingMetadata, PipelineEvent, Progress};

/// Observer of pipeline results.
///
/// Callbacks run on pipeline tasks and must not block.
pub trait ResultSink: Send + Sync {
    /// Fired after every item completes and whenever discovery raises the total.
    fn on_progress(&self, _progress: Progress) {}

    /// Partial update for one key. `None` fields are unchanged, not cleared.
    fn on_item_resolved(&self, _key: &str, _patch: &ItemPatch) {}

    /// Fired once per key per session.
    fn on_discovered(&self, _key: &str, _metadata: &ListingMetadata) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {}

/// Forwards callbacks as owned [`PipelineEvent`]s over an unbounded channel.
///
/// A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl ResultSink for ChannelSink {
    fn on_progress(&self, progress: Progress) {
        self.send(PipelineEvent::Progress(progress));
    }

    fn on_item_resolved(&self, key: &str, patch: &ItemPatch) {
        self.send(PipelineEvent::ItemResolved {
            key: key.to_string(),
            patch: patch.clone(),
        });
    }

    fn on_discovered(&self, key: &str, metadata: &ListingMetadata) {
        self.send(PipelineEvent::Discovered {
            key: key.to_string(),
            metadata: metadata.clone(),
        });
    }
}
