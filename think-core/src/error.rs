/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the knowledge hub engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store is locked")]
    Locked,

    #[error("Invalid password")]
    AuthInvalid,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider unavailable: {0}")]
    Provider(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Job cancelled")]
    JobCancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Transient(_) | Error::Storage(_) | Error::Provider(_) => true,
            Error::Locked
            | Error::AuthInvalid
            | Error::NotFound(_)
            | Error::Conflict(_)
            | Error::Validation(_)
            | Error::Decrypt(_)
            | Error::ModelUnavailable(_)
            | Error::JobCancelled
            | Error::Serialization(_)
            | Error::Io(_) => false,
        }
    }

    /// Shorthand for a `NotFound` with an entity name and id
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{entity} {id}"))
    }
}
