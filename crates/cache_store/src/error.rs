use std::path::PathBuf;

use thiserror::Error;

use crate::schema::CacheKind;

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cache file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache file {path} has unsupported version {found}; expected {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("cache file {path} holds '{found}' entries; expected '{expected}'")]
    KindMismatch {
        path: PathBuf,
        found: CacheKind,
        expected: CacheKind,
    },

    #[error("failed to serialize {kind} cache for {path}: {source}")]
    Serialize {
        kind: CacheKind,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no per-user cache directory is available on this platform")]
    NoCacheDir,
}

impl CacheStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }
}
