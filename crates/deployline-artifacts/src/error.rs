//! Error types for the artifact store.

use thiserror::Error;

/// Result type alias for artifact store operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Errors that can occur during artifact store operations.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact {id} is corrupt: expected digest {expected}, found {actual}")]
    Corrupt {
        id: u64,
        expected: String,
        actual: String,
    },
}
