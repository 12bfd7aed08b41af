//! Run coordination.
//!
//! Selects root records newest first, then drives each one through
//! traversal and replication with its own visited set and inserted map.
//! Roots are processed one at a time; a root that fails is logged and the
//! run moves on to the next.

use std::sync::Arc;
use std::time::Instant;

use subsample_state::{
    ModelRegistry, OrderBy, Record, RecordKey, RecordStore, RelationMetadata, StoreConfig,
    SurrealRecordStore,
};
use tracing::{info, instrument, Instrument};

use crate::error::{Result, SyncError};
use crate::inserted::InsertedMap;
use crate::metrics::{MetricsSnapshot, SyncMetrics};
use crate::obs;
use crate::replication::{ReplicationOptions, Replicator};
use crate::traversal::{Traverser, VisitedSet};

/// Open a SurrealDB-backed store, mapping failures to
/// [`SyncError::Connection`].
pub async fn connect(config: &StoreConfig) -> Result<SurrealRecordStore> {
    SurrealRecordStore::connect(config)
        .await
        .map_err(|source| SyncError::Connection {
            store: config.label.clone(),
            source,
        })
}

/// What to sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Root entity type name
    pub entity: String,
    /// Number of root records to select
    pub limit: usize,
    /// Relation edges followed from each root
    pub max_depth: usize,
}

impl RunPlan {
    pub fn new(entity: impl Into<String>, limit: usize, max_depth: usize) -> Self {
        Self {
            entity: entity.into(),
            limit,
            max_depth,
        }
    }
}

impl Default for RunPlan {
    fn default() -> Self {
        Self::new("User", 2, 3)
    }
}

/// Outcome for one root record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReport {
    pub root: RecordKey,
    /// Distinct records in the association tree
    pub records: usize,
    /// Records successfully written to the target store
    pub written: usize,
    /// Whether the root itself reached the target store
    pub success: bool,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub entity: String,
    pub roots: Vec<RootReport>,
    pub metrics: MetricsSnapshot,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Roots whose tree was written.
    pub fn migrated(&self) -> usize {
        self.roots.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordKey> {
        self.roots.iter().filter(|r| !r.success).map(|r| &r.root)
    }
}

/// Drives sampling runs between a source and a target store.
pub struct Coordinator {
    source: Arc<dyn RecordStore>,
    target: Arc<dyn RecordStore>,
    source_models: Arc<ModelRegistry>,
    target_models: Arc<ModelRegistry>,
    options: ReplicationOptions,
}

impl Coordinator {
    /// Both stores are described by the same models.
    pub fn new(
        source: Arc<dyn RecordStore>,
        target: Arc<dyn RecordStore>,
        models: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            source,
            target,
            source_models: Arc::clone(&models),
            target_models: models,
            options: ReplicationOptions::default(),
        }
    }

    /// Describe the target store with its own models.
    pub fn with_target_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.target_models = models;
        self
    }

    pub fn with_options(mut self, options: ReplicationOptions) -> Self {
        self.options = options;
        self
    }

    /// Sample `plan.limit` roots of `plan.entity` into the target store.
    ///
    /// Fails only before the first root: unknown entity type, schema
    /// bootstrap, or root selection. Per-root failures are reported in the
    /// summary.
    #[instrument(skip_all, fields(entity = %plan.entity))]
    pub async fn run(&self, plan: &RunPlan) -> Result<RunSummary> {
        let started = Instant::now();
        obs::emit_run_started(&plan.entity, plan.limit, plan.max_depth);

        let entity = self.source_models.describe(&plan.entity)?;
        self.target
            .ensure_schema(&self.target_models)
            .await
            .map_err(SyncError::SchemaSetup)?;

        let roots = self
            .source
            .find_page(entity, plan.limit, &OrderBy::newest_first(entity))
            .await
            .map_err(|source| SyncError::Fetch {
                what: format!("{} roots", entity.name),
                source,
            })?;
        info!(count = roots.len(), "Selected {} {} records", roots.len(), entity.name);

        let metrics = SyncMetrics::new();
        let total = roots.len();
        let mut reports = Vec::with_capacity(total);
        for (index, root) in roots.into_iter().enumerate() {
            let span = obs::root_span(&root.key());
            let report = self
                .sample_root(root, index + 1, total, plan.max_depth, &metrics)
                .instrument(span)
                .await;
            reports.push(report);
        }

        metrics.flush();
        let summary = RunSummary {
            entity: entity.name.clone(),
            roots: reports,
            metrics: metrics.snapshot(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        obs::emit_run_finished(
            &summary.entity,
            summary.duration_ms,
            summary.roots.len(),
            summary.migrated(),
        );
        Ok(summary)
    }

    /// Traverse one root with a fresh visited set, then replicate the tree
    /// with a fresh inserted map.
    async fn sample_root(
        &self,
        root: Record,
        position: usize,
        total: usize,
        max_depth: usize,
        metrics: &SyncMetrics,
    ) -> RootReport {
        let key = root.key();
        obs::emit_root_started(&key, position, total);

        let mut visited = VisitedSet::new();
        let traverser = Traverser::new(&*self.source, &*self.source_models, metrics);
        let tree = traverser.traverse(root, 0, max_depth, &mut visited).await;

        let inserted = InsertedMap::new();
        let replicator = Replicator::new(&*self.target, &*self.target_models, metrics)
            .with_options(self.options);
        let written = replicator.replicate(&tree, &inserted).await;

        let report = RootReport {
            root: key,
            records: tree.distinct_records().len(),
            written: inserted.written(),
            success: written.is_some(),
        };
        obs::emit_root_finished(&report.root, report.records, report.written, report.success);
        report
    }
}
