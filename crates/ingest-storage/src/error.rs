use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl StorageError {
    /// Transient errors are worth retrying per spec §7's Transport policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
