//! Association traversal.
//!
//! Expands a root record into a depth-bounded association tree by following
//! every declared relation against the source store. A per-root
//! [`VisitedSet`] stops a record from being expanded twice, which bounds the
//! work and breaks relation cycles.
//!
//! Traversal is sequential: children appear in the order the store returned
//! them, and a failed relation read is logged and dropped without touching
//! the rest of the tree.

use std::collections::{BTreeSet, HashSet};

use futures::future::{BoxFuture, FutureExt};
use subsample_state::{
    Record, RecordKey, RecordStore, RelationDescriptor, RelationKind, RelationMetadata,
};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::obs;

/// Records already expanded during one root's traversal.
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: HashSet<RecordKey>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a record visited. Returns `false` if it already was.
    pub fn insert(&mut self, key: RecordKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Why a node does or does not carry associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Relations were read; `associations` holds whatever was found.
    Expanded,
    /// Depth bound reached; relations were not explored.
    Truncated,
    /// Expanded elsewhere in the same tree; this occurrence carries nothing.
    AlreadyVisited,
}

/// Children attached under one relation name.
#[derive(Debug, Clone)]
pub enum Association {
    /// `ToOne` relation.
    One(Box<AssociationNode>),
    /// `ToMany` or `ManyToMany` relation, in store order.
    Many(Vec<AssociationNode>),
}

impl Association {
    pub fn nodes(&self) -> Vec<&AssociationNode> {
        match self {
            Association::One(node) => vec![node.as_ref()],
            Association::Many(nodes) => nodes.iter().collect(),
        }
    }
}

/// One record plus its expanded relations.
#[derive(Debug, Clone)]
pub struct AssociationNode {
    pub record: Record,
    pub state: NodeState,
    /// Relation name to children, in declaration order. Relations that
    /// resolved to nothing are absent.
    pub associations: Vec<(String, Association)>,
}

impl AssociationNode {
    fn leaf(record: Record, state: NodeState) -> Self {
        Self {
            record,
            state,
            associations: Vec::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    pub fn association(&self, relation: &str) -> Option<&Association> {
        self.associations
            .iter()
            .find(|(name, _)| name == relation)
            .map(|(_, association)| association)
    }

    /// Distinct records anywhere in the tree, this node included.
    pub fn distinct_records(&self) -> BTreeSet<RecordKey> {
        let mut keys = BTreeSet::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, keys: &mut BTreeSet<RecordKey>) {
        keys.insert(self.key());
        for (_, association) in &self.associations {
            for child in association.nodes() {
                child.collect_keys(keys);
            }
        }
    }

    /// Longest relation path below this node, in edges.
    pub fn height(&self) -> usize {
        self.associations
            .iter()
            .flat_map(|(_, association)| association.nodes())
            .map(|child| child.height() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total node count, repeated occurrences included.
    pub fn node_count(&self) -> usize {
        1 + self
            .associations
            .iter()
            .flat_map(|(_, association)| association.nodes())
            .map(AssociationNode::node_count)
            .sum::<usize>()
    }
}

/// Builds association trees from the source store.
pub struct Traverser<'a> {
    source: &'a dyn RecordStore,
    metadata: &'a dyn RelationMetadata,
    metrics: &'a SyncMetrics,
}

impl<'a> Traverser<'a> {
    pub fn new(
        source: &'a dyn RecordStore,
        metadata: &'a dyn RelationMetadata,
        metrics: &'a SyncMetrics,
    ) -> Self {
        Self {
            source,
            metadata,
            metrics,
        }
    }

    /// Expand `root` at `depth` until `max_depth`.
    ///
    /// The depth bound is checked before the visited set, so a truncated
    /// occurrence does not claim the record: a shallower path met later in
    /// the walk can still expand it.
    pub fn traverse<'t>(
        &'t self,
        root: Record,
        depth: usize,
        max_depth: usize,
        visited: &'t mut VisitedSet,
    ) -> BoxFuture<'t, AssociationNode> {
        async move {
            if depth >= max_depth {
                return AssociationNode::leaf(root, NodeState::Truncated);
            }
            let key = root.key();
            if !visited.insert(key.clone()) {
                debug!(record = %key, "already visited, not expanding");
                return AssociationNode::leaf(root, NodeState::AlreadyVisited);
            }

            let entity = match self.metadata.describe(&root.entity) {
                Ok(entity) => entity,
                Err(e) => {
                    self.metrics.inc_fetch_failures();
                    obs::emit_relation_skipped(&key, "*", &e);
                    return AssociationNode::leaf(root, NodeState::Expanded);
                }
            };

            let mut associations = Vec::new();
            for relation in &entity.relations {
                let related = match self.fetch_related(&root, relation).await {
                    Ok(related) => related,
                    Err(e) => {
                        self.metrics.inc_fetch_failures();
                        obs::emit_relation_skipped(&key, &relation.name, &e);
                        continue;
                    }
                };
                if related.is_empty() {
                    continue;
                }
                if relation.kind != RelationKind::ToOne {
                    obs::emit_relation_found(&key, &relation.name, related.len());
                }

                let mut children = Vec::with_capacity(related.len());
                for record in related {
                    children.push(
                        self.traverse(record, depth + 1, max_depth, &mut *visited)
                            .await,
                    );
                }
                let association = match relation.kind {
                    RelationKind::ToOne => match children.pop() {
                        Some(child) => Association::One(Box::new(child)),
                        None => continue,
                    },
                    _ => Association::Many(children),
                };
                associations.push((relation.name.clone(), association));
            }

            AssociationNode {
                record: root,
                state: NodeState::Expanded,
                associations,
            }
        }
        .boxed()
    }

    /// Read the records one relation points at. `ToOne` yields at most one.
    async fn fetch_related(
        &self,
        owner: &Record,
        relation: &RelationDescriptor,
    ) -> Result<Vec<Record>> {
        let what = || format!("{}.{} of {}", owner.entity, relation.name, owner.id);
        let target = self.metadata.describe(&relation.target)?;

        match &relation.kind {
            RelationKind::ToOne => {
                let fk = owner
                    .foreign_key(&relation.foreign_key)
                    .map_err(|source| SyncError::Fetch {
                        what: what(),
                        source,
                    })?;
                let Some(fk) = fk else {
                    return Ok(Vec::new());
                };
                let found = self
                    .source
                    .find_by_id(target, &fk)
                    .await
                    .map_err(|source| SyncError::Fetch {
                        what: what(),
                        source,
                    })?;
                Ok(found.into_iter().collect())
            }
            RelationKind::ToMany => self
                .source
                .find_all_by_foreign_key(target, &relation.foreign_key, &owner.id)
                .await
                .map_err(|source| SyncError::Fetch {
                    what: what(),
                    source,
                }),
            RelationKind::ManyToMany { .. } => self
                .source
                .find_join_members(owner, relation, target)
                .await
                .map_err(|source| SyncError::Fetch {
                    what: what(),
                    source,
                }),
        }
    }
}
