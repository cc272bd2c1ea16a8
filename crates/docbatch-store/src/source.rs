use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use docbatch_types::Document;

use crate::error::StoreResult;
use crate::filter::Filter;

/// A raw collection handle: runs a filter and returns every matching document.
#[async_trait]
pub trait RawCollection: Send + Sync {
    /// The collection name, used to scope cache keys.
    fn collection_name(&self) -> &str;

    /// Return all documents matching `filter`, in any order.
    async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>>;
}

/// A model-style handle (schema layer on top of a collection).
///
/// Implementations must return plain documents, not hydrated model
/// instances, so results can be matched and cached like raw ones.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    /// Name of the collection the model is bound to.
    fn collection_name(&self) -> &str;

    /// Run `filter` through the model and return plain documents.
    async fn find_lean(&self, filter: &Filter) -> StoreResult<Vec<Document>>;
}

/// Which kind of handle a [`QuerySource`] wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    RawCollection,
    ModelBacked,
}

/// The single query capability the loader depends on.
///
/// The variant is chosen once, when the source is constructed.
#[derive(Clone)]
pub enum QuerySource {
    RawCollection(Arc<dyn RawCollection>),
    ModelBacked(Arc<dyn ModelHandle>),
}

impl QuerySource {
    pub fn raw(collection: impl RawCollection + 'static) -> Self {
        Self::RawCollection(Arc::new(collection))
    }

    pub fn model(model: impl ModelHandle + 'static) -> Self {
        Self::ModelBacked(Arc::new(model))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::RawCollection(_) => SourceKind::RawCollection,
            Self::ModelBacked(_) => SourceKind::ModelBacked,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        match self {
            Self::RawCollection(c) => c.collection_name(),
            Self::ModelBacked(m) => m.collection_name(),
        }
    }

    /// Execute `filter` once.
    pub async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        match self {
            Self::RawCollection(c) => c.find(filter).await,
            Self::ModelBacked(m) => m.find_lean(filter).await,
        }
    }
}

impl fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySource")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}
