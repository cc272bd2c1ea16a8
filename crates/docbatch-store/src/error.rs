/// Errors from store query operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store rejected or failed to execute a query.
    #[error("query on collection {collection} failed: {reason}")]
    QueryFailed { collection: String, reason: String },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A filter or document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<docbatch_types::TypeError> for StoreError {
    fn from(err: docbatch_types::TypeError) -> Self {
        Self::Serialization(err.to_string())
    }
}
