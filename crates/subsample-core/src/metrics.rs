//! Per-run atomic counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`SyncMetrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lightweight atomic counters. No allocations, no locking.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    records_created: AtomicU64,
    records_updated: AtomicU64,
    relations_rewired: AtomicU64,
    join_memberships: AtomicU64,
    write_failures: AtomicU64,
    fetch_failures: AtomicU64,
    relations_skipped: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_created: u64,
    pub records_updated: u64,
    pub relations_rewired: u64,
    pub join_memberships: u64,
    pub write_failures: u64,
    pub fetch_failures: u64,
    pub relations_skipped: u64,
}

fn bump(counter: &AtomicU64, metric: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric, "counter incremented");
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_created(&self) {
        bump(&self.records_created, "records_created");
    }

    pub fn inc_updated(&self) {
        bump(&self.records_updated, "records_updated");
    }

    /// A foreign key was pointed at a target-side identifier.
    pub fn inc_rewired(&self) {
        bump(&self.relations_rewired, "relations_rewired");
    }

    pub fn inc_join_memberships(&self) {
        bump(&self.join_memberships, "join_memberships");
    }

    pub fn inc_write_failures(&self) {
        bump(&self.write_failures, "write_failures");
    }

    pub fn inc_fetch_failures(&self) {
        bump(&self.fetch_failures, "fetch_failures");
    }

    pub fn inc_relations_skipped(&self) {
        bump(&self.relations_skipped, "relations_skipped");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_created: self.records_created.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            relations_rewired: self.relations_rewired.load(Ordering::Relaxed),
            join_memberships: self.join_memberships.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            relations_skipped: self.relations_skipped.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            records_created = s.records_created,
            records_updated = s.records_updated,
            relations_rewired = s.relations_rewired,
            join_memberships = s.join_memberships,
            write_failures = s.write_failures,
            fetch_failures = s.fetch_failures,
            relations_skipped = s.relations_skipped,
        );
    }
}
