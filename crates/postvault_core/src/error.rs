use thiserror::Error;

/// Unified error type for postvault operations
#[derive(Debug, Error)]
pub enum VaultError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read blob '{key}': {source}")]
    BlobRead {
        key: String,
        source: std::io::Error,
    },

    #[error("Failed to write blob '{key}': {source}")]
    BlobWrite {
        key: String,
        source: std::io::Error,
    },

    // Encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed blob at '{key}': {reason}")]
    MalformedBlob { key: String, reason: String },

    // Commit chain errors
    #[error("Unknown commit id '{0}'")]
    CommitNotFound(String),

    #[error("Commit chain link '{0}' is missing or unreadable")]
    BrokenCommitLink(String),
}

/// Result type alias for postvault operations
pub type Result<T> = std::result::Result<T, VaultError>;
