//! Subsample Core Library
//!
//! Copies a depth-bounded slice of a record graph from a source store into
//! a target store. Each root record is expanded into an association tree
//! (`traversal`), then written to the target in dependency order with its
//! relations rewired to target-side identifiers (`replication`). The
//! `coordinator` drives one root at a time.

pub mod coordinator;
mod error;
pub mod inserted;
pub mod metrics;
pub mod obs;
pub mod replication;
pub mod telemetry;
pub mod traversal;

pub use coordinator::{connect, Coordinator, RootReport, RunPlan, RunSummary};
pub use error::{Result, SyncError};
pub use inserted::InsertedMap;
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use obs::{
    emit_record_failed, emit_record_written, emit_relation_found, emit_relation_skipped,
    emit_root_finished, emit_root_started, emit_run_finished, emit_run_started, root_span,
};
pub use replication::{ReplicationOptions, Replicator};
pub use telemetry::init_tracing;
pub use traversal::{Association, AssociationNode, NodeState, Traverser, VisitedSet};
