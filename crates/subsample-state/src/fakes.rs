//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRecordStore`, which satisfies the `RecordStore` contract
//! without any external dependencies and adds failure injection and write
//! counters for engine tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::metadata::{EntityType, ModelRegistry, RelationDescriptor, RelationKind};
use crate::record::{FieldMap, Identifier, Record};
use crate::storage_traits::*;

/// How `create` picks the identifier of a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// Keep the identifier hint (shared identifier space).
    #[default]
    Preserve,
    /// Ignore the hint and assign sequential integers starting at `start`.
    Assign { start: i64 },
}

type JoinRow = BTreeMap<String, Identifier>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, BTreeMap<Identifier, FieldMap>>,
    joins: HashMap<String, Vec<JoinRow>>,
    next_id: Option<i64>,
    failing_writes: HashSet<(String, Identifier)>,
    failing_reads: HashSet<String>,
    failing_joins: HashSet<(String, Identifier)>,
    creates: u64,
    updates: u64,
    schema_runs: u64,
}

/// In-memory record store backed by `HashMap<table, BTreeMap<id, fields>>`.
///
/// Join tables are kept as lists of `{column: id}` rows.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
    id_policy: IdPolicy,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_policy(id_policy: IdPolicy) -> Self {
        let next_id = match id_policy {
            IdPolicy::Preserve => None,
            IdPolicy::Assign { start } => Some(start),
        };
        Self {
            state: Mutex::new(MemoryState {
                next_id,
                ..MemoryState::default()
            }),
            id_policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a row directly, bypassing counters and failure injection.
    pub fn seed(&self, entity: &EntityType, id: impl Into<Identifier>, fields: FieldMap) {
        self.lock()
            .tables
            .entry(entity.table.clone())
            .or_default()
            .insert(id.into(), fields);
    }

    /// Insert a join row directly for a `ManyToMany` relation.
    pub fn seed_join(
        &self,
        relation: &RelationDescriptor,
        owner: impl Into<Identifier>,
        member: impl Into<Identifier>,
    ) {
        if let RelationKind::ManyToMany { through, join_key } = &relation.kind {
            let row = JoinRow::from([
                (relation.foreign_key.clone(), owner.into()),
                (join_key.clone(), member.into()),
            ]);
            self.lock().joins.entry(through.clone()).or_default().push(row);
        }
    }

    /// Make every `create`/`update` of this record fail.
    pub fn fail_writes_for(&self, entity: &EntityType, id: impl Into<Identifier>) {
        self.lock()
            .failing_writes
            .insert((entity.table.clone(), id.into()));
    }

    /// Make every join row in `through` that names `member` fail to register.
    pub fn fail_joins_for(&self, through: &str, member: impl Into<Identifier>) {
        self.lock()
            .failing_joins
            .insert((through.to_string(), member.into()));
    }

    /// Make every read of this table fail.
    pub fn fail_reads_for(&self, table: &str) {
        self.lock().failing_reads.insert(table.to_string());
    }

    /// Fields of one row.
    pub fn get(&self, table: &str, id: &Identifier) -> Option<FieldMap> {
        self.lock().tables.get(table).and_then(|t| t.get(id).cloned())
    }

    /// Number of rows in a table.
    pub fn count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    /// Identifiers present in a table, ascending.
    pub fn ids(&self, table: &str) -> Vec<Identifier> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows in a join table.
    pub fn join_count(&self, table: &str) -> usize {
        self.lock().joins.get(table).map_or(0, Vec::len)
    }

    /// Successful `create` calls so far.
    pub fn created_count(&self) -> u64 {
        self.lock().creates
    }

    /// Successful `update` calls so far.
    pub fn updated_count(&self) -> u64 {
        self.lock().updates
    }

    /// Completed `ensure_schema` calls so far.
    pub fn schema_runs(&self) -> u64 {
        self.lock().schema_runs
    }

    fn check_read(state: &MemoryState, table: &str) -> StorageResult<()> {
        if state.failing_reads.contains(table) {
            return Err(StorageError::Backend(format!("read failure injected on {table}")));
        }
        Ok(())
    }

    fn check_write(state: &MemoryState, table: &str, id: &Identifier) -> StorageResult<()> {
        if state
            .failing_writes
            .contains(&(table.to_string(), id.clone()))
        {
            return Err(StorageError::Backend(format!(
                "write failure injected on {table}:{id}"
            )));
        }
        Ok(())
    }
}

/// Order JSON values the way a database would for sorting: missing/null
/// first, then numbers, then strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_id(
        &self,
        entity: &EntityType,
        id: &Identifier,
    ) -> StorageResult<Option<Record>> {
        let state = self.lock();
        Self::check_read(&state, &entity.table)?;
        Ok(state
            .tables
            .get(&entity.table)
            .and_then(|t| t.get(id))
            .map(|fields| Record::new(entity.name.clone(), id.clone(), fields.clone())))
    }

    async fn find_all_by_foreign_key(
        &self,
        entity: &EntityType,
        column: &str,
        value: &Identifier,
    ) -> StorageResult<Vec<Record>> {
        let state = self.lock();
        Self::check_read(&state, &entity.table)?;
        let wanted = value.to_value();
        Ok(state
            .tables
            .get(&entity.table)
            .map(|t| {
                t.iter()
                    .filter(|(_, fields)| fields.get(column) == Some(&wanted))
                    .map(|(id, fields)| Record::new(entity.name.clone(), id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_page(
        &self,
        entity: &EntityType,
        limit: usize,
        order: &OrderBy,
    ) -> StorageResult<Vec<Record>> {
        let state = self.lock();
        Self::check_read(&state, &entity.table)?;
        let mut rows: Vec<Record> = state
            .tables
            .get(&entity.table)
            .map(|t| {
                t.iter()
                    .map(|(id, fields)| Record::new(entity.name.clone(), id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            let by_column = match &order.column {
                Some(column) => compare_values(a.get(column), b.get(column)),
                None => Ordering::Equal,
            };
            by_column.then_with(|| a.id.cmp(&b.id))
        });
        if order.descending {
            rows.reverse();
        }
        rows.truncate(limit);
        Ok(rows)
    }

    async fn find_join_members(
        &self,
        owner: &Record,
        relation: &RelationDescriptor,
        member: &EntityType,
    ) -> StorageResult<Vec<Record>> {
        let RelationKind::ManyToMany { through, join_key } = &relation.kind else {
            return Err(StorageError::Backend(format!(
                "relation {} has no join table",
                relation.name
            )));
        };

        let state = self.lock();
        Self::check_read(&state, through)?;
        Self::check_read(&state, &member.table)?;

        let member_ids: Vec<Identifier> = state
            .joins
            .get(through)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get(&relation.foreign_key) == Some(&owner.id))
                    .filter_map(|row| row.get(join_key).cloned())
                    .collect()
            })
            .unwrap_or_default();

        let table = state.tables.get(&member.table);
        Ok(member_ids
            .into_iter()
            .filter_map(|id| {
                table
                    .and_then(|t| t.get(&id))
                    .map(|fields| Record::new(member.name.clone(), id.clone(), fields.clone()))
            })
            .collect())
    }

    async fn create(
        &self,
        entity: &EntityType,
        id_hint: &Identifier,
        fields: FieldMap,
    ) -> StorageResult<Record> {
        // Give concurrent writers a chance to interleave.
        tokio::task::yield_now().await;

        let mut state = self.lock();
        Self::check_write(&state, &entity.table, id_hint)?;

        let id = match self.id_policy {
            IdPolicy::Preserve => id_hint.clone(),
            IdPolicy::Assign { start } => {
                let next = state.next_id.unwrap_or(start);
                state.next_id = Some(next + 1);
                Identifier::Int(next)
            }
        };

        let table = state.tables.entry(entity.table.clone()).or_default();
        if table.contains_key(&id) {
            return Err(StorageError::Backend(format!(
                "duplicate key {id} in {}",
                entity.table
            )));
        }
        table.insert(id.clone(), fields.clone());
        state.creates += 1;
        Ok(Record::new(entity.name.clone(), id, fields))
    }

    async fn update(
        &self,
        entity: &EntityType,
        record: &Record,
        fields: FieldMap,
    ) -> StorageResult<Record> {
        tokio::task::yield_now().await;

        let mut state = self.lock();
        Self::check_write(&state, &entity.table, &record.id)?;

        let row = state
            .tables
            .get_mut(&entity.table)
            .and_then(|t| t.get_mut(&record.id))
            .ok_or_else(|| {
                StorageError::Backend(format!("{}:{} does not exist", entity.table, record.id))
            })?;
        for (column, value) in fields {
            row.insert(column, value);
        }
        let merged = row.clone();
        state.updates += 1;
        Ok(Record::new(entity.name.clone(), record.id.clone(), merged))
    }

    async fn add_join_membership(
        &self,
        owner: &Record,
        relation: &RelationDescriptor,
        member: &Record,
    ) -> StorageResult<()> {
        let RelationKind::ManyToMany { through, join_key } = &relation.kind else {
            return Err(StorageError::Backend(format!(
                "relation {} has no join table",
                relation.name
            )));
        };

        let row = JoinRow::from([
            (relation.foreign_key.clone(), owner.id.clone()),
            (join_key.clone(), member.id.clone()),
        ]);
        let mut state = self.lock();
        if state
            .failing_joins
            .contains(&(through.clone(), member.id.clone()))
        {
            return Err(StorageError::Backend(format!(
                "join failure injected on {through}:{}",
                member.id
            )));
        }
        let rows = state.joins.entry(through.clone()).or_default();
        if !rows.contains(&row) {
            rows.push(row);
        }
        Ok(())
    }

    async fn ensure_schema(&self, registry: &ModelRegistry) -> StorageResult<()> {
        let mut state = self.lock();
        for entity in registry.entities() {
            state.tables.entry(entity.table.clone()).or_default();
        }
        for join in registry.join_tables() {
            state.joins.entry(join.table).or_default();
        }
        state.schema_runs += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::field_map;
    use serde_json::json;

    fn users() -> EntityType {
        EntityType::new("User", "users")
    }

    #[tokio::test]
    async fn assign_policy_ignores_hint() {
        let store = MemoryRecordStore::with_id_policy(IdPolicy::Assign { start: 100 });
        let a = store
            .create(&users(), &Identifier::Int(1), FieldMap::new())
            .await
            .unwrap();
        let b = store
            .create(&users(), &Identifier::Int(1), FieldMap::new())
            .await
            .unwrap();
        assert_eq!(a.id, Identifier::Int(100));
        assert_eq!(b.id, Identifier::Int(101));
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let store = MemoryRecordStore::new();
        store.fail_writes_for(&users(), 3);
        let err = store
            .create(&users(), &Identifier::Int(3), FieldMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        assert_eq!(store.count("users"), 0);
    }

    #[tokio::test]
    async fn injected_join_failure_leaves_other_pairs() {
        let store = MemoryRecordStore::new();
        let roles =
            RelationDescriptor::many_to_many("roles", "Role", "UserId", "users_roles", "RoleId");
        store.fail_joins_for("users_roles", 6);

        let owner = Record::new("User", Identifier::Int(1), FieldMap::new());
        let admin = Record::new("Role", Identifier::Int(5), FieldMap::new());
        let ops = Record::new("Role", Identifier::Int(6), FieldMap::new());
        store.add_join_membership(&owner, &roles, &admin).await.unwrap();
        let err = store
            .add_join_membership(&owner, &roles, &ops)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend(_)));
        assert_eq!(store.join_count("users_roles"), 1);
    }

    #[test]
    fn values_compare_like_a_database() {
        assert_eq!(
            compare_values(Some(&json!(1)), Some(&json!(2))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(None, Some(&json!("2024-01-01"))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }

    #[tokio::test]
    async fn seeded_rows_are_visible() {
        let store = MemoryRecordStore::new();
        store.seed(&users(), 1, field_map(json!({"username": "ada"})));
        let found = store
            .find_by_id(&users(), &Identifier::Int(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.entity, "User");
        assert_eq!(found.get("username"), Some(&json!("ada")));
    }
}
