/// Errors from cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The backend rejected the operation.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// The backend could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
