//! Dependency-ordered replication of an association tree.
//!
//! Every node is upserted into the target store before its children, and
//! recorded in the [`InsertedMap`] so a record reachable through several
//! paths is written once. Relations are then re-established with the
//! identifiers the target store returned:
//!
//! - `ToOne`: the parent's foreign key is pointed at the child.
//! - `ToMany`: each child's foreign key is pointed at the parent.
//! - `ManyToMany`: each (parent, child) pair is added to the join table.
//!
//! Failures stay local. A failed self-write yields `None` for that node and
//! its subtree; a failed rewire is logged and its siblings carry on.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use subsample_state::{
    EntityType, FieldMap, Identifier, Record, RecordKey, RecordStore, RelationDescriptor,
    RelationKind, RelationMetadata, StorageError,
};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::inserted::InsertedMap;
use crate::metrics::SyncMetrics;
use crate::obs;
use crate::traversal::{Association, AssociationNode};

/// Tuning for replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationOptions {
    /// Children of one collection replicated at the same time. `1` is
    /// strictly sequential.
    pub child_concurrency: usize,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            child_concurrency: 4,
        }
    }
}

impl ReplicationOptions {
    pub fn sequential() -> Self {
        Self {
            child_concurrency: 1,
        }
    }
}

fn single_field(column: &str, id: &Identifier) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(column.to_string(), id.to_value());
    fields
}

/// Writes association trees into the target store.
pub struct Replicator<'a> {
    target: &'a dyn RecordStore,
    metadata: &'a dyn RelationMetadata,
    metrics: &'a SyncMetrics,
    options: ReplicationOptions,
}

impl<'a> Replicator<'a> {
    pub fn new(
        target: &'a dyn RecordStore,
        metadata: &'a dyn RelationMetadata,
        metrics: &'a SyncMetrics,
    ) -> Self {
        Self {
            target,
            metadata,
            metrics,
            options: ReplicationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReplicationOptions) -> Self {
        self.options = options;
        self
    }

    /// Replicate `node` and everything below it.
    ///
    /// Returns the target-side record for `node`, or `None` if its
    /// self-write failed now or earlier in the same tree.
    pub fn replicate<'r>(
        &'r self,
        node: &'r AssociationNode,
        inserted: &'r InsertedMap,
    ) -> BoxFuture<'r, Option<Record>> {
        async move {
            let written = inserted
                .get_or_write(&node.key(), || self.write_self(&node.record))
                .await;
            let target = written?;

            if !node.associations.is_empty() {
                self.replicate_children(node, &target, inserted).await;
            }
            Some(target)
        }
        .boxed()
    }

    async fn write_self(&self, record: &Record) -> Option<Record> {
        let key = record.key();
        match self.upsert(record).await {
            Ok((target, created)) => {
                if created {
                    self.metrics.inc_created();
                } else {
                    self.metrics.inc_updated();
                }
                obs::emit_record_written(&key, &target.key(), created);
                Some(target)
            }
            Err(e) => {
                self.metrics.inc_write_failures();
                obs::emit_record_failed(&key, &e);
                None
            }
        }
    }

    /// Update the target row with the same identifier, or create it.
    async fn upsert(&self, record: &Record) -> Result<(Record, bool)> {
        let entity = self.metadata.describe(&record.entity)?;
        let fields = entity.project(&record.fields);
        let write_error = |source: StorageError| SyncError::Write {
            key: record.key(),
            source,
        };

        match self
            .target
            .find_by_id(entity, &record.id)
            .await
            .map_err(write_error)?
        {
            Some(existing) => {
                let updated = self
                    .target
                    .update(entity, &existing, fields)
                    .await
                    .map_err(write_error)?;
                Ok((updated, false))
            }
            None => {
                let created = self
                    .target
                    .create(entity, &record.id, fields)
                    .await
                    .map_err(write_error)?;
                Ok((created, true))
            }
        }
    }

    async fn replicate_children(
        &self,
        node: &AssociationNode,
        parent: &Record,
        inserted: &InsertedMap,
    ) {
        let source_key = node.key();
        let entity = match self.metadata.describe(&parent.entity) {
            Ok(entity) => entity,
            Err(e) => {
                obs::emit_relation_skipped(&source_key, "*", &e);
                return;
            }
        };

        for (name, association) in &node.associations {
            let relation = match entity.relation(name) {
                Some(relation) => relation,
                None => {
                    self.skip_unsupported(&source_key, name);
                    continue;
                }
            };

            match (&relation.kind, association) {
                (RelationKind::ToOne, Association::One(child)) => {
                    self.link_to_one(entity, parent, relation, child, inserted)
                        .await;
                }
                (
                    RelationKind::ToMany | RelationKind::ManyToMany { .. },
                    Association::Many(children),
                ) => {
                    let links: Vec<BoxFuture<'_, ()>> = children
                        .iter()
                        .map(|child| self.link_member(parent, relation, child, inserted).boxed())
                        .collect();
                    stream::iter(links)
                        .buffered(self.options.child_concurrency.max(1))
                        .collect::<Vec<()>>()
                        .await;
                }
                _ => self.skip_unsupported(&source_key, name),
            }
        }
    }

    fn skip_unsupported(&self, owner: &RecordKey, relation: &str) {
        let err = SyncError::UnsupportedAssociation {
            entity: owner.entity.clone(),
            relation: relation.to_string(),
        };
        self.metrics.inc_relations_skipped();
        obs::emit_relation_skipped(owner, relation, &err);
    }

    /// Replicate a `ToOne` child, then point the parent's foreign key at it.
    async fn link_to_one(
        &self,
        entity: &EntityType,
        parent: &Record,
        relation: &RelationDescriptor,
        child: &AssociationNode,
        inserted: &InsertedMap,
    ) {
        let Some(child_target) = self.replicate(child, inserted).await else {
            debug!(relation = %relation.name, child = %child.key(), "child not written, keeping foreign key");
            return;
        };

        let fields = single_field(&relation.foreign_key, &child_target.id);
        match self.target.update(entity, parent, fields).await {
            Ok(_) => self.metrics.inc_rewired(),
            Err(source) => self.rewire_failed(parent, source),
        }
    }

    /// Replicate one collection member, then link it to the parent.
    async fn link_member(
        &self,
        parent: &Record,
        relation: &RelationDescriptor,
        child: &AssociationNode,
        inserted: &InsertedMap,
    ) {
        let Some(child_target) = self.replicate(child, inserted).await else {
            debug!(relation = %relation.name, child = %child.key(), "child not written, not linking");
            return;
        };

        match &relation.kind {
            RelationKind::ManyToMany { .. } => {
                match self
                    .target
                    .add_join_membership(parent, relation, &child_target)
                    .await
                {
                    Ok(()) => self.metrics.inc_join_memberships(),
                    Err(source) => self.rewire_failed(parent, source),
                }
            }
            _ => {
                let child_entity = match self.metadata.describe(&child_target.entity) {
                    Ok(entity) => entity,
                    Err(e) => {
                        obs::emit_relation_skipped(&parent.key(), &relation.name, &e);
                        return;
                    }
                };
                let fields = single_field(&relation.foreign_key, &parent.id);
                match self.target.update(child_entity, &child_target, fields).await {
                    Ok(_) => self.metrics.inc_rewired(),
                    Err(source) => self.rewire_failed(&child_target, source),
                }
            }
        }
    }

    fn rewire_failed(&self, record: &Record, source: StorageError) {
        let err = SyncError::Write {
            key: record.key(),
            source,
        };
        self.metrics.inc_write_failures();
        obs::emit_record_failed(&record.key(), &err);
    }
}
