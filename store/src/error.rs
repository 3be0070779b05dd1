use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Re-saving a record that must be unique (caller bug).
    #[error("duplicate record: {0}")]
    DuplicateRecord(String),

    /// A secondary entry disagrees with its primary record; not repairable.
    #[error("inconsistent database: {0}")]
    InconsistentDatabase(String),

    #[error("index version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
