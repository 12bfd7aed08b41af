//! Relation metadata provider.
//!
//! Describes, for each entity type, its table, its columns and the relations
//! it declares. Both stores are assumed to share one description; the
//! registry is immutable once a run starts.
//!
//! Model definitions are usually loaded from a JSON file:
//!
//! ```text
//! {
//!   "entities": [
//!     {
//!       "name": "User",
//!       "table": "users",
//!       "fields": ["username", "password"],
//!       "relations": [
//!         { "name": "orders", "kind": "to_many", "target": "Order", "foreign_key": "userId" },
//!         { "name": "roles", "kind": "many_to_many", "target": "Role",
//!           "foreign_key": "UserId", "through": "users_roles", "join_key": "RoleId" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::record::FieldMap;

/// Kind of a relation, dispatched by a single `match` in traversal and
/// replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// The owning record holds the foreign key.
    ToOne,
    /// Target records hold a foreign key back to the owner.
    ToMany,
    /// Membership lives in a separate join table. The descriptor's
    /// `foreign_key` is the owner column of that table, `join_key` the
    /// member column.
    ManyToMany { through: String, join_key: String },
}

impl RelationKind {
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::ToOne => "to_one",
            RelationKind::ToMany => "to_many",
            RelationKind::ManyToMany { .. } => "many_to_many",
        }
    }
}

/// One declared relationship of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Relation name, unique within the owning entity type
    pub name: String,
    /// Target entity type name
    pub target: String,
    /// Foreign-key column (see [`RelationKind`] for which table holds it)
    pub foreign_key: String,
    #[serde(flatten)]
    pub kind: RelationKind,
}

impl RelationDescriptor {
    pub fn to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
            kind: RelationKind::ToOne,
        }
    }

    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
            kind: RelationKind::ToMany,
        }
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        through: impl Into<String>,
        join_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
            kind: RelationKind::ManyToMany {
                through: through.into(),
                join_key: join_key.into(),
            },
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_created_at() -> Option<String> {
    Some("createdAt".to_string())
}

/// A named record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    /// Primary-key column (default `id`)
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Columns copied on replication. Empty means "every column".
    #[serde(default)]
    pub fields: Vec<String>,
    /// Creation timestamp column used to pick the newest roots.
    /// `null` falls back to identifier order.
    #[serde(default = "default_created_at")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            fields: Vec::new(),
            created_at: default_created_at(),
            relations: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_created_at(mut self, column: Option<&str>) -> Self {
        self.created_at = column.map(str::to_string);
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    fn owns_foreign_key(&self, column: &str) -> bool {
        self.relations
            .iter()
            .any(|r| r.kind == RelationKind::ToOne && r.foreign_key == column)
    }

    /// Select the columns a self-write copies into the target store.
    ///
    /// The primary key is always dropped. With declared `fields`, only those
    /// plus the foreign keys this entity owns are kept.
    pub fn project(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .filter(|(column, _)| **column != self.primary_key)
            .filter(|(column, _)| {
                self.fields.is_empty()
                    || self.fields.iter().any(|f| f == *column)
                    || self.owns_foreign_key(column)
            })
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }
}

/// A join table and its two key columns (sorted).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct JoinTable {
    pub table: String,
    pub columns: [String; 2],
}

/// Read access to entity descriptions.
pub trait RelationMetadata: Send + Sync {
    /// Describe an entity type by name.
    fn describe(&self, entity: &str) -> Result<&EntityType, MetadataError>;
}

/// `true` when `name` is safe to splice into a query as a table or column.
pub fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Deserialize)]
struct ModelFile {
    entities: Vec<EntityType>,
}

/// In-memory set of entity types.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entities: Vec<EntityType>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity type. Call [`ModelRegistry::validate`] once
    /// the set is complete.
    pub fn with_entity(mut self, entity: EntityType) -> Self {
        match self.index.get(&entity.name) {
            Some(&pos) => self.entities[pos] = entity,
            None => {
                self.index.insert(entity.name.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
        self
    }

    /// Build a validated registry from a list of entity types.
    pub fn from_entities(entities: Vec<EntityType>) -> Result<Self, MetadataError> {
        let mut seen = HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.name.clone()) {
                return Err(MetadataError::InvalidSchema(format!(
                    "entity type {} is defined twice",
                    entity.name
                )));
            }
        }
        let registry = entities
            .into_iter()
            .fold(Self::new(), |registry, entity| registry.with_entity(entity));
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_json_str(json: &str) -> Result<Self, MetadataError> {
        let file: ModelFile = serde_json::from_str(json)?;
        Self::from_entities(file.entities)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Built-in sample models: users and roles joined through `users_roles`.
    pub fn sample() -> Self {
        Self::new()
            .with_entity(
                EntityType::new("User", "users")
                    .with_fields(["username", "password", "createdAt", "updatedAt"])
                    .with_relation(RelationDescriptor::many_to_many(
                        "roles",
                        "Role",
                        "UserId",
                        "users_roles",
                        "RoleId",
                    )),
            )
            .with_entity(
                EntityType::new("Role", "roles")
                    .with_fields([
                        "name",
                        "code",
                        "maxLimit",
                        "minLimit",
                        "workFlowLevel",
                        "createdAt",
                        "updatedAt",
                    ])
                    .with_relation(RelationDescriptor::many_to_many(
                        "users",
                        "User",
                        "RoleId",
                        "users_roles",
                        "UserId",
                    )),
            )
    }

    /// Check names, relation targets and join definitions.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let invalid = |what: &str, name: &str| {
            MetadataError::InvalidSchema(format!("{what} `{name}` is not a plain identifier"))
        };

        for entity in &self.entities {
            if !is_plain_name(&entity.table) {
                return Err(invalid("table", &entity.table));
            }
            if !is_plain_name(&entity.primary_key) {
                return Err(invalid("primary key", &entity.primary_key));
            }
            if let Some(column) = &entity.created_at {
                if !is_plain_name(column) {
                    return Err(invalid("column", column));
                }
            }

            let mut relation_names = HashSet::new();
            for relation in &entity.relations {
                if !relation_names.insert(relation.name.as_str()) {
                    return Err(MetadataError::InvalidSchema(format!(
                        "relation {} is declared twice on {}",
                        relation.name, entity.name
                    )));
                }
                if !self.index.contains_key(&relation.target) {
                    return Err(MetadataError::InvalidSchema(format!(
                        "relation {}.{} targets unknown entity type {}",
                        entity.name, relation.name, relation.target
                    )));
                }
                if !is_plain_name(&relation.foreign_key) {
                    return Err(invalid("column", &relation.foreign_key));
                }
                if let RelationKind::ManyToMany { through, join_key } = &relation.kind {
                    if !is_plain_name(through) {
                        return Err(invalid("table", through));
                    }
                    if !is_plain_name(join_key) {
                        return Err(invalid("column", join_key));
                    }
                    if join_key == &relation.foreign_key {
                        return Err(MetadataError::InvalidSchema(format!(
                            "relation {}.{} uses {} for both join columns",
                            entity.name, relation.name, join_key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn entities(&self) -> &[EntityType] {
        &self.entities
    }

    /// Distinct join tables declared by `ManyToMany` relations.
    pub fn join_tables(&self) -> Vec<JoinTable> {
        let tables: BTreeSet<JoinTable> = self
            .entities
            .iter()
            .flat_map(|e| e.relations.iter())
            .filter_map(|r| match &r.kind {
                RelationKind::ManyToMany { through, join_key } => {
                    let mut columns = [r.foreign_key.clone(), join_key.clone()];
                    columns.sort();
                    Some(JoinTable {
                        table: through.clone(),
                        columns,
                    })
                }
                _ => None,
            })
            .collect();
        tables.into_iter().collect()
    }
}

impl RelationMetadata for ModelRegistry {
    fn describe(&self, entity: &str) -> Result<&EntityType, MetadataError> {
        self.index
            .get(entity)
            .map(|&pos| &self.entities[pos])
            .ok_or_else(|| MetadataError::UnknownEntity(entity.to_string()))
    }
}
