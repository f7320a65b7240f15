use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("{0}")]
    MalformedRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("All clusters are at capacity or file size exceeds limits")]
    CapacityExceeded,

    #[error("{0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<object_store::Error> for GateError {
    fn from(error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { path, .. } => {
                GateError::NotFound(format!("Input file not found: {}", path))
            }
            other => GateError::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
