//! Error types for subsample-state

use thiserror::Error;

/// Errors raised by a [`crate::RecordStore`] implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Store connection or authentication error
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Query or write rejected by the backend
    #[error("store backend error: {0}")]
    Backend(String),

    /// A value could not be interpreted as a record identifier
    #[error("invalid record identifier: {value}")]
    InvalidIdentifier { value: String },

    /// A table or column name is not a plain identifier
    #[error("invalid table or column name: {name}")]
    InvalidName { name: String },

    /// Schema bootstrap error
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Errors raised while loading or querying relation metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Entity type is not part of the model registry
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// Relation is not declared on the entity type
    #[error("entity type {entity} has no relation named {relation}")]
    UnknownRelation { entity: String, relation: String },

    /// Model definitions are inconsistent
    #[error("invalid model schema: {0}")]
    InvalidSchema(String),

    /// Schema file could not be read
    #[error("failed to read model schema: {0}")]
    Io(#[from] std::io::Error),

    /// Schema file is not valid JSON for the model format
    #[error("failed to parse model schema: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while reading store configuration from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is absent
    #[error("{0} not set")]
    MissingVar(String),

    /// Port variable is not a valid TCP port
    #[error("{var} is not a valid port: {value}")]
    InvalidPort { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_variable() {
        let err = ConfigError::MissingVar("SOURCE_SQL_HOST".to_string());
        assert_eq!(err.to_string(), "SOURCE_SQL_HOST not set");
    }

    #[test]
    fn metadata_error_wraps_json_errors() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = MetadataError::from(parse);
        assert!(matches!(err, MetadataError::Parse(_)));
    }
}
