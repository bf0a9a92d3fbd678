//! Scheduling of enrichment work.
//!
//! This module provides:
//! - **WorkQueue**: FIFO of pending items, one per key.
//! - **Scheduler**: starts queued items under a concurrency cap, resolves each
//!   rating cache-first and reports results to the sink.
//! - **RetrySweeper**: re-enqueues session keys left with a retryable sentinel.
//!
//! # Architecture
//!
//! 1. Discovery enqueues work items and asks the scheduler to drain
//! 2. The scheduler spawns up to `concurrency` item tasks
//! 3. Each finished item releases its slot and drains again
//! 4. The sweeper periodically puts failed keys back into the queue

mod manager;
mod queue;
mod sweeper;

pub use manager::{Scheduler, SchedulerConfig};
pub use queue::WorkQueue;
pub use sweeper::{RetrySweeper, SweepState, SweeperConfig};
