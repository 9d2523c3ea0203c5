use std::time::Duration;

use crate::coordinator::SubIndex;
use crate::types::FileId;

#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid search pattern: {0}")]
    BadPattern(String),
    #[error("Unknown file id {0:?}")]
    UnknownFile(FileId),
    #[error("Search cancelled")]
    Cancelled,
    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
    #[error("Required sub-indexes unavailable: {0:?}")]
    IndexUnavailable(Vec<SubIndex>),
    #[error("Could not acquire read locks for {0:?}")]
    LockContention(Vec<SubIndex>),
}

impl Error {
    /// Whether the coordinator's retry policy applies. Only transient lock
    /// contention is worth retrying; everything else is a hard failure.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockContention(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
