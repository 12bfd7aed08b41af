//! Storage trait definitions for Subsample
//!
//! `RecordStore` is the only seam between the sampling engines and a
//! concrete database. One instance wraps the source store, another the
//! target store. All operations are async and may suspend the caller.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::metadata::{EntityType, ModelRegistry, RelationDescriptor};
use crate::record::{FieldMap, Identifier, Record};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Sort order for page queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to sort by. `None` sorts by identifier.
    pub column: Option<String>,
    pub descending: bool,
}

impl OrderBy {
    /// Newest first by the entity's creation column, falling back to
    /// identifier order when it declares none.
    pub fn newest_first(entity: &EntityType) -> Self {
        Self {
            column: entity.created_at.clone(),
            descending: true,
        }
    }

    pub fn by_id(descending: bool) -> Self {
        Self {
            column: None,
            descending,
        }
    }
}

/// Record store adapter.
///
/// Guarantees:
/// - `find_*` never mutate the store.
/// - `create` returns the stored record; its identifier is the hint unless
///   the store assigns identifiers itself.
/// - `update` merges `fields` into the existing row and returns the result.
/// - `add_join_membership` is idempotent per (owner, member) pair.
/// - `ensure_schema` is idempotent.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point lookup by primary key.
    async fn find_by_id(
        &self,
        entity: &EntityType,
        id: &Identifier,
    ) -> StorageResult<Option<Record>>;

    /// All records of `entity` whose `column` equals `value`.
    async fn find_all_by_foreign_key(
        &self,
        entity: &EntityType,
        column: &str,
        value: &Identifier,
    ) -> StorageResult<Vec<Record>>;

    /// Up to `limit` records of `entity` in the given order.
    async fn find_page(
        &self,
        entity: &EntityType,
        limit: usize,
        order: &OrderBy,
    ) -> StorageResult<Vec<Record>>;

    /// Records of `member` joined to `owner` through a `ManyToMany` relation.
    async fn find_join_members(
        &self,
        owner: &Record,
        relation: &RelationDescriptor,
        member: &EntityType,
    ) -> StorageResult<Vec<Record>>;

    /// Insert a new record.
    async fn create(
        &self,
        entity: &EntityType,
        id_hint: &Identifier,
        fields: FieldMap,
    ) -> StorageResult<Record>;

    /// Merge `fields` into an existing record.
    async fn update(
        &self,
        entity: &EntityType,
        record: &Record,
        fields: FieldMap,
    ) -> StorageResult<Record>;

    /// Register `member` under `owner` in the relation's join table.
    async fn add_join_membership(
        &self,
        owner: &Record,
        relation: &RelationDescriptor,
        member: &Record,
    ) -> StorageResult<()>;

    /// Create tables and indexes for every entity type and join table.
    async fn ensure_schema(&self, registry: &ModelRegistry) -> StorageResult<()>;
}
