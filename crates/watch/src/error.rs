use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to obtain content from the source.  Never fatal: the cycle for
/// that tick is abandoned and state stays untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to read {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to preserve corrupt update log as {}: {source}", path.display())]
    Preserve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize log state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to acquire writer lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
