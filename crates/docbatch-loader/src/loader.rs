use std::sync::Arc;

use tracing::{debug, info};

use docbatch_cache::KeyValueCache;
use docbatch_store::QuerySource;
use docbatch_types::{Document, Identifier};

use crate::cache_layer::CacheLayer;
use crate::config::LoaderConfig;
use crate::coordinator::BatchCoordinator;
use crate::error::LoaderResult;
use crate::request::{Fields, FindOptions, LookupRequest};

/// Cache-fronted, batching document loader for one collection.
///
/// Lookups first consult the cache. Misses are coalesced with every other
/// lookup issued in the same scheduling tick and resolved by a single store
/// query. With a positive TTL in [`FindOptions`], results (including
/// "not found") are written back to the cache.
pub struct DocumentLoader {
    coordinator: BatchCoordinator,
    cache: CacheLayer,
}

impl DocumentLoader {
    pub fn new(
        source: QuerySource,
        cache: Option<Arc<dyn KeyValueCache>>,
        config: LoaderConfig,
    ) -> Self {
        let cache = CacheLayer::new(source.name(), cache);
        info!(
            collection = source.name(),
            kind = ?source.kind(),
            cached = cache.is_enabled(),
            "document loader ready"
        );
        Self {
            coordinator: BatchCoordinator::new(source, config),
            cache,
        }
    }

    /// A loader without a cache, using the default configuration.
    pub fn uncached(source: QuerySource) -> Self {
        Self::new(source, None, LoaderConfig::default())
    }

    pub fn collection_name(&self) -> &str {
        self.coordinator.source().name()
    }

    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// Find the document whose id field equals `id`.
    ///
    /// Returns the first match, or `None` when nothing matches.
    pub async fn find_one_by_id(
        &self,
        id: impl Into<Identifier>,
        options: FindOptions,
    ) -> LoaderResult<Option<Document>> {
        let request = LookupRequest::point(id);
        let signature = request.signature();
        if let Some(cached) = self.cache.get::<Option<Document>>(&signature).await? {
            return Ok(cached);
        }

        let documents = self.coordinator.enqueue(&request)?.await?;
        let document = documents.first().cloned();
        if let Some(ttl) = options.cache_ttl() {
            self.cache.set(&signature, &document, ttl).await?;
        }
        Ok(document)
    }

    /// [`find_one_by_id`](Self::find_one_by_id) for each id, in order.
    ///
    /// Every id missing from the cache is enqueued before the first
    /// suspension, so all of them resolve with one store query.
    pub async fn find_many_by_ids<I, T>(
        &self,
        ids: I,
        options: FindOptions,
    ) -> LoaderResult<Vec<Option<Document>>>
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        let requests: Vec<LookupRequest> = ids.into_iter().map(LookupRequest::point).collect();

        let mut results: Vec<Option<Option<Document>>> = Vec::with_capacity(requests.len());
        for request in &requests {
            results.push(self.cache.get(&request.signature()).await?);
        }

        let mut loads = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            if results[i].is_none() {
                loads.push((i, self.coordinator.enqueue(request)?));
            }
        }
        debug!(
            collection = self.collection_name(),
            requested = requests.len(),
            missed = loads.len(),
            "find many by ids"
        );

        for (i, load) in loads {
            let document = load.await?.first().cloned();
            if let Some(ttl) = options.cache_ttl() {
                self.cache.set(&requests[i].signature(), &document, ttl).await?;
            }
            results[i] = Some(document);
        }
        Ok(results.into_iter().map(Option::flatten).collect())
    }

    /// Find every document matching all of `fields`, in store order.
    pub async fn find_by_fields(
        &self,
        fields: Fields,
        options: FindOptions,
    ) -> LoaderResult<Vec<Document>> {
        let request = LookupRequest::fields(fields);
        let signature = request.signature();
        if let Some(cached) = self.cache.get::<Vec<Document>>(&signature).await? {
            return Ok(cached);
        }

        let documents = self.coordinator.enqueue(&request)?.await?.to_vec();
        if let Some(ttl) = options.cache_ttl() {
            self.cache.set(&signature, &documents, ttl).await?;
        }
        Ok(documents)
    }

    /// Drop what is remembered for the point lookup of `id`, both in this
    /// loader and in the cache.
    pub async fn delete_from_cache_by_id(&self, id: impl Into<Identifier>) -> LoaderResult<()> {
        let signature = LookupRequest::point(id).signature();
        self.coordinator.clear(&signature);
        let removed = self.cache.delete(&signature).await?;
        debug!(collection = self.collection_name(), %signature, removed, "invalidated id lookup");
        Ok(())
    }

    /// Drop what is remembered for the field lookup `fields`.
    ///
    /// Only the entry with exactly this signature is affected; overlapping
    /// field lookups keep their entries.
    pub async fn delete_from_cache_by_fields(&self, fields: &Fields) -> LoaderResult<()> {
        let signature = LookupRequest::fields(fields.clone()).signature();
        self.coordinator.clear(&signature);
        let removed = self.cache.delete(&signature).await?;
        debug!(collection = self.collection_name(), %signature, removed, "invalidated field lookup");
        Ok(())
    }
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("coordinator", &self.coordinator)
            .field("cache", &self.cache)
            .finish()
    }
}
