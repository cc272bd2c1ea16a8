use std::sync::Arc;

use docbatch_cache::CacheError;
use docbatch_store::StoreError;
use docbatch_types::TypeError;

/// Errors surfaced by loader operations.
///
/// Cloneable so one batch failure can be handed to every request that was
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoaderError {
    /// The combined store query failed. Shared by every waiter of the batch.
    #[error("store error: {0}")]
    Store(Arc<StoreError>),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A cached value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] TypeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Requests were enqueued outside a Tokio runtime.
    #[error("no async runtime available to dispatch the batch")]
    NoRuntime,

    /// The batch was dropped before delivering a result.
    #[error("batch window dropped before resolving")]
    WindowDropped,
}

/// Result alias for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

impl From<StoreError> for LoaderError {
    fn from(err: StoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}

impl From<toml::de::Error> for LoaderError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
