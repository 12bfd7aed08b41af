//! Error taxonomy for sampling runs.
//!
//! Only `Connection`, `MetadataLookup` (at root selection), `SchemaSetup`
//! and root-selection `Fetch` failures leave a run. Everything raised while
//! traversing or replicating one tree is logged and absorbed at the smallest
//! enclosing unit: a single relation or a single record.

use subsample_state::{MetadataError, RecordKey, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connection to {store} store failed: {source}")]
    Connection {
        store: String,
        #[source]
        source: StorageError,
    },

    #[error("metadata lookup failed: {0}")]
    MetadataLookup(#[from] MetadataError),

    #[error("target schema setup failed: {0}")]
    SchemaSetup(#[source] StorageError),

    #[error("failed to read {what}: {source}")]
    Fetch {
        what: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to write {key}: {source}")]
    Write {
        key: RecordKey,
        #[source]
        source: StorageError,
    },

    #[error("relation {relation} of {entity} is not available on the target side")]
    UnsupportedAssociation { entity: String, relation: String },
}

impl SyncError {
    /// Whether the error ends the whole run rather than one relation or record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Connection { .. } | SyncError::MetadataLookup(_) | SyncError::SchemaSetup(_)
        )
    }
}

/// Result type for run-level operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_names_the_record() {
        let err = SyncError::Write {
            key: RecordKey::new("Order", 10),
            source: StorageError::Backend("duplicate key".into()),
        };
        assert_eq!(
            err.to_string(),
            "failed to write Order:10: store backend error: duplicate key"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn metadata_errors_convert_and_are_fatal() {
        let err: SyncError = MetadataError::UnknownEntity("Invoice".into()).into();
        assert!(err.to_string().contains("unknown entity type: Invoice"));
        assert!(err.is_fatal());
    }
}
