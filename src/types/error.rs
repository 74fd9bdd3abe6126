use thiserror::Error;

/// esgtrack error types
#[derive(Error, Debug)]
pub enum EsgError {
    /// Live source unreachable or answered with a non-success status
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload was valid JSON but not the expected array/object
    #[error("shape error: {0}")]
    Shape(String),

    /// A single field could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// Source was reachable but returned zero records
    #[error("empty result from {0}")]
    Empty(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache operation failed
    #[error("cache error: {0}")]
    Cache(String),

    /// Cache file exists but could not be decoded
    #[error("corrupted cache: {0}")]
    CacheCorrupted(String),

    /// Cache file was written by an incompatible format version
    #[error("cache version {found} does not match expected {expected}")]
    CacheVersion { found: u32, expected: u32 },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Invalid invoice query parameters
    #[error("query error: {0}")]
    Query(String),

    /// Retrieval was cancelled by a newer refresh
    #[error("retrieval cancelled")]
    Cancelled,
}

impl EsgError {
    /// Whether this failure should send the retriever down the fallback chain
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            EsgError::Transport(_) | EsgError::Shape(_) | EsgError::Empty(_)
        )
    }
}

/// Result type alias for esgtrack
pub type Result<T> = std::result::Result<T, EsgError>;
