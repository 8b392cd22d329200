use std::path::PathBuf;

/// Errors returned by session stores.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The ID has no live record: never created, deleted, or expired.
    #[error("session record not found")]
    NoRecord,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session record {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// True for the backend-agnostic not-found signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NoRecord)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
