//! Structured observability hooks for sampling runs.
//!
//! Lifecycle events are emitted with an `event = "..."` field so they can be
//! filtered in JSON output. Everything logged while one root record is in
//! flight runs inside [`root_span`].

use std::fmt::Display;

use subsample_state::RecordKey;
use tracing::{info, info_span, warn, Span};

/// Span tagging every event produced for one root record.
///
/// Attach with `tracing::Instrument::instrument` so it follows the future
/// across await points.
pub fn root_span(root: &RecordKey) -> Span {
    info_span!("subsample.root", root = %root)
}

/// Emit event: run started.
pub fn emit_run_started(entity: &str, limit: usize, max_depth: usize) {
    info!(event = "run.started", entity = %entity, limit, max_depth);
}

/// Emit event: one root record is about to be traversed.
///
/// Also prints the progress line the operator watches.
pub fn emit_root_started(root: &RecordKey, position: usize, total: usize) {
    info!(
        event = "root.started",
        position,
        total,
        "Processing {} record {} of {} (ID: {})",
        root.entity,
        position,
        total,
        root.id
    );
}

/// Emit event: one root record's tree was replicated (or failed to).
pub fn emit_root_finished(root: &RecordKey, records: usize, written: usize, success: bool) {
    info!(
        event = "root.finished",
        root = %root,
        records,
        written,
        success,
    );
}

/// Emit event: related records found while expanding a relation.
pub fn emit_relation_found(owner: &RecordKey, relation: &str, count: usize) {
    info!(
        event = "relation.found",
        relation = %relation,
        count,
        "Found {} {} for {} ID: {}",
        count,
        relation,
        owner.entity,
        owner.id
    );
}

/// Emit event: a record was written to the target store.
pub fn emit_record_written(source: &RecordKey, target: &RecordKey, created: bool) {
    info!(
        event = "record.written",
        source = %source,
        target = %target,
        action = if created { "created" } else { "updated" },
    );
}

/// Emit event: a relation was skipped (warn level).
pub fn emit_relation_skipped(owner: &RecordKey, relation: &str, error: &dyn Display) {
    warn!(
        event = "relation.skipped",
        owner = %owner,
        relation = %relation,
        error = %error,
    );
}

/// Emit event: a record could not be written (warn level).
pub fn emit_record_failed(key: &RecordKey, error: &dyn Display) {
    warn!(event = "record.failed", key = %key, error = %error);
}

/// Emit event: run finished with duration and totals.
pub fn emit_run_finished(entity: &str, duration_ms: u64, processed: usize, migrated: usize) {
    info!(
        event = "run.finished",
        entity = %entity,
        duration_ms,
        processed,
        migrated,
        "{} {} records migrated with their associations",
        processed,
        entity
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Instrument;

    #[tokio::test]
    async fn root_span_wraps_future() {
        let key = RecordKey::new("User", 1);
        let out = async { 7 }.instrument(root_span(&key)).await;
        assert_eq!(out, 7);
    }
}
