//! Subsample-State: record stores and relation metadata
//!
//! This crate provides the persistence layer for Subsample. It handles all
//! I/O with the source and target databases behind one storage trait, and
//! describes the entity types and relations both stores share.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: record access, relation metadata, and schema bootstrap.
//!
//! ## Key Components
//!
//! - `RecordStore`: Store adapter trait (lookups, writes, join membership)
//! - `SurrealRecordStore`: SurrealDB implementation of `RecordStore`
//! - `ModelRegistry`: Relation metadata provider (entity types + relations)
//! - `StoreConfig`: Per-store connection settings read from the environment

pub mod config;
mod error;
pub mod fakes;
pub mod metadata;
pub mod migrations;
pub mod record;
pub mod storage_traits;
mod surreal_store;

pub use config::{StoreConfig, StoreEndpoint, SOURCE_PREFIX, TARGET_PREFIX};
pub use error::{ConfigError, MetadataError, StorageError};
pub use metadata::{
    EntityType, JoinTable, ModelRegistry, RelationDescriptor, RelationKind, RelationMetadata,
};
pub use record::{field_map, FieldMap, Identifier, Record, RecordKey};
pub use storage_traits::{OrderBy, RecordStore, StorageResult};
pub use surreal_store::SurrealRecordStore;
