//! SurrealDB-backed RecordStore implementation
//!
//! Each entity type lives in its own table and each record's SurrealDB id is
//! the record identifier (`users:1`). Join tables hold one row per
//! (owner, member) pair, keyed by the pair itself so registering a pair twice
//! leaves a single row.
//!
//! Supports both local (in-memory) and remote (WebSocket) connections.

use async_trait::async_trait;
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Database;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::{StoreConfig, StoreEndpoint};
use crate::error::StorageError;
use crate::metadata::{is_plain_name, EntityType, ModelRegistry, RelationDescriptor, RelationKind};
use crate::migrations;
use crate::record::{FieldMap, Identifier, Record};
use crate::storage_traits::{OrderBy, RecordStore, StorageResult};

/// Projected column carrying the record identifier in query results.
const KEY_FIELD: &str = "__subsample_key";

/// SurrealDB connection wrapped as a [`RecordStore`].
#[derive(Clone)]
pub struct SurrealRecordStore {
    db: Surreal<Any>,
    label: String,
}

/// Quote a validated table or column name for splicing into a query.
fn quoted(name: &str) -> StorageResult<String> {
    if is_plain_name(name) {
        Ok(format!("`{name}`"))
    } else {
        Err(StorageError::InvalidName {
            name: name.to_string(),
        })
    }
}

fn select_from(source: &str) -> String {
    format!("SELECT meta::id(id) AS {KEY_FIELD}, * OMIT id FROM {source}")
}

/// Turn one result row into a [`Record`] of `entity`.
fn decode_row(entity: &EntityType, row: Value) -> StorageResult<Record> {
    let Value::Object(mut fields) = row else {
        return Err(StorageError::Backend(format!(
            "unexpected row shape in {}",
            entity.table
        )));
    };
    let key = fields.remove(KEY_FIELD).unwrap_or(Value::Null);
    let id = Identifier::try_from_value(&key)?.ok_or_else(|| StorageError::InvalidIdentifier {
        value: key.to_string(),
    })?;
    fields.remove(&entity.primary_key);
    Ok(Record::new(entity.name.clone(), id, fields))
}

fn decode_rows(entity: &EntityType, rows: Vec<Value>) -> StorageResult<Vec<Record>> {
    rows.into_iter().map(|row| decode_row(entity, row)).collect()
}

fn limit_value(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl SurrealRecordStore {
    /// Connect, authenticate when the endpoint requires it, and select the
    /// namespace and database.
    #[instrument(skip_all, fields(store = %config.label, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        let endpoint = config.endpoint_url();
        info!("Connecting to {}", endpoint);

        let db = surrealdb::engine::any::connect(&endpoint)
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to connect to {}: {}", endpoint, e))
            })?;

        if let StoreEndpoint::Remote {
            username, password, ..
        } = &config.endpoint
        {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username,
                password,
            })
            .await
            .map_err(|e| StorageError::Connection(format!("Authentication failed: {}", e)))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        info!("{} store connection established successfully", config.label);
        Ok(Self {
            db,
            label: config.label.clone(),
        })
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&StoreConfig::in_memory("MEMORY")).await
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_one(&self, entity: &EntityType, id: &Identifier) -> StorageResult<Option<Record>> {
        let mut result = self
            .db
            .query(select_from("type::thing($tb, $id)"))
            .bind(("tb", entity.table.clone()))
            .bind(("id", id.clone()))
            .await?;

        let rows: Vec<Value> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(|row| decode_row(entity, row))
            .transpose()
    }
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    #[instrument(skip_all, fields(store = %self.label, table = %entity.table, id = %id))]
    async fn find_by_id(
        &self,
        entity: &EntityType,
        id: &Identifier,
    ) -> StorageResult<Option<Record>> {
        self.fetch_one(entity, id).await
    }

    #[instrument(skip_all, fields(store = %self.label, table = %entity.table))]
    async fn find_all_by_foreign_key(
        &self,
        entity: &EntityType,
        column: &str,
        value: &Identifier,
    ) -> StorageResult<Vec<Record>> {
        let sql = format!(
            "{} WHERE {} = $value ORDER BY {KEY_FIELD}",
            select_from("type::table($tb)"),
            quoted(column)?
        );
        let mut result = self
            .db
            .query(sql)
            .bind(("tb", entity.table.clone()))
            .bind(("value", value.clone()))
            .await?;

        let rows: Vec<Value> = result.take(0)?;
        debug!(found = rows.len(), "Foreign key lookup");
        decode_rows(entity, rows)
    }

    #[instrument(skip_all, fields(store = %self.label, table = %entity.table))]
    async fn find_page(
        &self,
        entity: &EntityType,
        limit: usize,
        order: &OrderBy,
    ) -> StorageResult<Vec<Record>> {
        let direction = if order.descending { "DESC" } else { "ASC" };
        let ordering = match &order.column {
            Some(column) => format!("{} {direction}, {KEY_FIELD} {direction}", quoted(column)?),
            None => format!("{KEY_FIELD} {direction}"),
        };
        let sql = format!(
            "{} ORDER BY {ordering} LIMIT $limit",
            select_from("type::table($tb)")
        );
        let mut result = self
            .db
            .query(sql)
            .bind(("tb", entity.table.clone()))
            .bind(("limit", limit_value(limit)))
            .await?;

        let rows: Vec<Value> = result.take(0)?;
        decode_rows(entity, rows)
    }

    #[instrument(skip_all, fields(store = %self.label, relation = %relation.name))]
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

        let sql = format!(
            "{} WHERE meta::id(id) IN (SELECT VALUE {} FROM type::table($through) WHERE {} = $owner) ORDER BY {KEY_FIELD}",
            select_from("type::table($tb)"),
            quoted(join_key)?,
            quoted(&relation.foreign_key)?
        );
        let mut result = self
            .db
            .query(sql)
            .bind(("tb", member.table.clone()))
            .bind(("through", through.clone()))
            .bind(("owner", owner.id.clone()))
            .await?;

        let rows: Vec<Value> = result.take(0)?;
        decode_rows(member, rows)
    }

    #[instrument(skip_all, fields(store = %self.label, table = %entity.table, id = %id_hint))]
    async fn create(
        &self,
        entity: &EntityType,
        id_hint: &Identifier,
        fields: FieldMap,
    ) -> StorageResult<Record> {
        let sql = format!(
            "CREATE type::thing($tb, $id) CONTENT $fields RETURN NONE; {};",
            select_from("type::thing($tb, $id)")
        );
        let mut result = self
            .db
            .query(sql)
            .bind(("tb", entity.table.clone()))
            .bind(("id", id_hint.clone()))
            .bind(("fields", Value::Object(fields)))
            .await?
            .check()?;

        let rows: Vec<Value> = result.take(1)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            StorageError::Backend(format!("failed to create {}:{}", entity.table, id_hint))
        })?;
        decode_row(entity, row)
    }

    #[instrument(skip_all, fields(store = %self.label, table = %entity.table, id = %record.id))]
    async fn update(
        &self,
        entity: &EntityType,
        record: &Record,
        fields: FieldMap,
    ) -> StorageResult<Record> {
        let sql = format!(
            "UPDATE type::thing($tb, $id) MERGE $fields RETURN NONE; {};",
            select_from("type::thing($tb, $id)")
        );
        let mut result = self
            .db
            .query(sql)
            .bind(("tb", entity.table.clone()))
            .bind(("id", record.id.clone()))
            .bind(("fields", Value::Object(fields)))
            .await?
            .check()?;

        let rows: Vec<Value> = result.take(1)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            StorageError::Backend(format!("{}:{} does not exist", entity.table, record.id))
        })?;
        decode_row(entity, row)
    }

    #[instrument(skip_all, fields(store = %self.label, relation = %relation.name))]
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

        // Key the row by its values in column-name order so that both sides
        // of the relation address the same row.
        let mut pairs = [
            (relation.foreign_key.clone(), owner.id.clone()),
            (join_key.clone(), member.id.clone()),
        ];
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let key: Vec<Value> = pairs.iter().map(|(_, id)| id.to_value()).collect();
        let row: FieldMap = pairs
            .into_iter()
            .map(|(column, id)| (column, id.to_value()))
            .collect();

        self.db
            .query("UPSERT type::thing($through, $key) CONTENT $row RETURN NONE")
            .bind(("through", through.clone()))
            .bind(("key", key))
            .bind(("row", Value::Object(row)))
            .await?
            .check()?;

        debug!(owner = %owner.id, member = %member.id, "Join membership registered");
        Ok(())
    }

    async fn ensure_schema(&self, registry: &ModelRegistry) -> StorageResult<()> {
        migrations::ensure_schema(&self.db, registry).await
    }
}
