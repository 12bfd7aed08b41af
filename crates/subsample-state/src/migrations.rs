//! SurrealDB schema bootstrap for the target store
//!
//! Defines one schemaless table per entity type and per join table, and
//! indexes the columns that relation lookups filter on. Every statement uses
//! `IF NOT EXISTS`, so bootstrapping is safe to repeat.

use std::collections::BTreeSet;

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::metadata::{ModelRegistry, RelationKind, RelationMetadata};
use crate::storage_traits::StorageResult;

/// Build the DDL statements for a registry, tables first.
pub fn schema_statements(registry: &ModelRegistry) -> Vec<String> {
    let mut tables = BTreeSet::new();
    let mut indexes = BTreeSet::new();

    for entity in registry.entities() {
        tables.insert(entity.table.clone());
        for relation in &entity.relations {
            if relation.kind == RelationKind::ToMany {
                if let Ok(target) = registry.describe(&relation.target) {
                    indexes.insert((target.table.clone(), relation.foreign_key.clone()));
                }
            }
        }
    }
    for join in registry.join_tables() {
        tables.insert(join.table.clone());
        for column in join.columns {
            indexes.insert((join.table.clone(), column));
        }
    }

    let mut statements: Vec<String> = tables
        .into_iter()
        .map(|table| format!("DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;"))
        .collect();
    statements.extend(indexes.into_iter().map(|(table, column)| {
        format!("DEFINE INDEX IF NOT EXISTS idx_{table}_{column} ON TABLE {table} COLUMNS {column};")
    }));
    statements
}

/// Create every table and index the registry needs.
///
/// Safe to call multiple times (idempotent).
pub async fn ensure_schema(db: &Surreal<Any>, registry: &ModelRegistry) -> StorageResult<()> {
    info!("Ensuring target schema");

    registry
        .validate()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;

    let statements = schema_statements(registry);
    debug!(statements = statements.len(), "Applying schema statements");

    db.query(statements.join("\n"))
        .await
        .and_then(|response| response.check())
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;

    info!("Schema synchronization complete");
    Ok(())
}
