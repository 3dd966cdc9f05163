use thiserror::Error;

pub type Result<T> = std::result::Result<T, KillboardError>;

/// Every failure a sync run can hit.
///
/// Transport variants abort the run before anything is persisted. A missing
/// archive or cache file is not an error: the store and caches initialize
/// empty state instead.
#[derive(Error, Debug)]
pub enum KillboardError {
    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Upstream returned status {status} twice for {url}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Upstream returned an unusable body twice for {url}")]
    Garbage { url: String },

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response cache error: {0}")]
    Cache(#[from] rusqlite::Error),
}

impl KillboardError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        KillboardError::Malformed(msg.into())
    }

    /// True for failures that came from talking to an upstream API.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KillboardError::Transport { .. }
                | KillboardError::UpstreamStatus { .. }
                | KillboardError::Garbage { .. }
        )
    }
}

impl From<tempfile::PersistError> for KillboardError {
    fn from(err: tempfile::PersistError) -> Self {
        KillboardError::Io(err.error)
    }
}
