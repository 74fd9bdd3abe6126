//! Type definitions for esgtrack

mod error;
mod invoice;
mod snapshot;

pub use error::*;
pub use invoice::*;
pub use snapshot::*;

use serde::Serialize;

/// Cache loading warning types
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CacheWarning {
    /// Failed to open or read cache file
    LoadFailed(String),
    /// Cache file was corrupted (invalid JSON)
    Corrupted(String),
    /// Cache version mismatch, snapshot ignored
    VersionMismatch(String),
}

impl From<&EsgError> for CacheWarning {
    fn from(err: &EsgError) -> Self {
        match err {
            EsgError::CacheCorrupted(msg) => CacheWarning::Corrupted(msg.clone()),
            EsgError::CacheVersion { .. } => CacheWarning::VersionMismatch(err.to_string()),
            other => CacheWarning::LoadFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_warning_from_error() {
        assert_eq!(
            CacheWarning::from(&EsgError::CacheCorrupted("bad json".into())),
            CacheWarning::Corrupted("bad json".into())
        );
        assert!(matches!(
            CacheWarning::from(&EsgError::CacheVersion {
                found: 9,
                expected: 1
            }),
            CacheWarning::VersionMismatch(_)
        ));
        assert!(matches!(
            CacheWarning::from(&EsgError::Cache("locked".into())),
            CacheWarning::LoadFailed(_)
        ));
    }
}
