//! Shared-cache access for loader results.
//!
//! Entries live under `<collection>-<signature>` and hold the result in
//! extended JSON, so ids survive the round trip. Not-found point lookups
//! are stored as `null`.
//!
//! Field signatures always start with `{`. A point signature starting with
//! `{` or `$` gets one extra leading `$`, so the two kinds never share a key
//! while ordinary ids keep the plain `<collection>-<id>` form.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use docbatch_cache::{KeyValueCache, SetOptions};
use docbatch_types::codec;

use crate::error::LoaderResult;
use crate::signature::Signature;

/// Optional external cache scoped to one collection.
#[derive(Clone)]
pub struct CacheLayer {
    cache: Option<Arc<dyn KeyValueCache>>,
    prefix: String,
}

impl CacheLayer {
    pub fn new(collection: &str, cache: Option<Arc<dyn KeyValueCache>>) -> Self {
        Self {
            cache,
            prefix: format!("{collection}-"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn key(&self, signature: &Signature) -> String {
        let suffix = signature.as_str();
        if signature.is_point() && suffix.starts_with(['{', '$']) {
            format!("{}${}", self.prefix, suffix)
        } else {
            format!("{}{}", self.prefix, suffix)
        }
    }

    /// Decoded entry for `signature`, `None` on a miss or without a cache.
    pub async fn get<T: DeserializeOwned>(&self, signature: &Signature) -> LoaderResult<Option<T>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let key = self.key(signature);
        match cache.get(&key).await? {
            Some(raw) => {
                trace!(%key, "cache hit");
                Ok(Some(codec::from_str(&raw)?))
            }
            None => {
                trace!(%key, "cache miss");
                Ok(None)
            }
        }
    }

    /// Store `value` under `signature` for `ttl`. No-op without a cache.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        signature: &Signature,
        value: &T,
        ttl: Duration,
    ) -> LoaderResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let key = self.key(signature);
        let encoded = codec::to_string(value)?;
        cache.set(&key, encoded, SetOptions { ttl: Some(ttl) }).await?;
        debug!(%key, ttl_secs = ttl.as_secs(), "cached result");
        Ok(())
    }

    /// Remove the entry for `signature`. Returns `true` if one existed.
    pub async fn delete(&self, signature: &Signature) -> LoaderResult<bool> {
        let Some(cache) = &self.cache else {
            return Ok(false);
        };
        let key = self.key(signature);
        let removed = cache.delete(&key).await?;
        debug!(%key, removed, "cache entry deleted");
        Ok(removed)
    }
}

impl fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("enabled", &self.is_enabled())
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Fields;
    use crate::error::LoaderError;
    use docbatch_cache::InMemoryCache;
    use docbatch_types::{Document, Identifier, ObjectId};

    fn layer() -> (Arc<InMemoryCache>, CacheLayer) {
        let cache = Arc::new(InMemoryCache::new());
        let layer = CacheLayer::new("test", Some(cache.clone()));
        (cache, layer)
    }

    #[test]
    fn keys_are_prefixed_by_collection() {
        let (_, layer) = layer();
        let id = ObjectId::new();
        let point = Signature::point(&Identifier::from(id));
        assert_eq!(layer.key(&point), format!("test-{}", id.to_hex()));

        let fields = Signature::fields(&Fields::new().field("tags", "foo"));
        assert_eq!(layer.key(&fields), r#"test-{"tags":["foo"]}"#);
    }

    #[test]
    fn point_keys_never_shadow_field_keys() {
        let (_, layer) = layer();
        let fields = Signature::fields(&Fields::new().field("tags", "foo"));
        let lookalike = Signature::point(&Identifier::from(r#"{"tags":["foo"]}"#));
        assert_eq!(lookalike.as_str(), fields.as_str());
        assert_ne!(layer.key(&lookalike), layer.key(&fields));
        assert_eq!(layer.key(&lookalike), r#"test-${"tags":["foo"]}"#);

        let dollar = Signature::point(&Identifier::from("$x"));
        let escaped = Signature::point(&Identifier::from("$$x"));
        assert_eq!(layer.key(&dollar), "test-$$x");
        assert_ne!(layer.key(&dollar), layer.key(&escaped));
    }

    #[tokio::test]
    async fn lookalike_point_misses_field_entry() {
        let (_, layer) = layer();
        let fields = Signature::fields(&Fields::new().field("tags", "foo"));
        layer.set(&fields, &vec![Document::new().with("_id", "1")], Duration::from_secs(5)).await.unwrap();

        let lookalike = Signature::point(&Identifier::from(r#"{"tags":["foo"]}"#));
        let hit: Option<Option<Document>> = layer.get(&lookalike).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn round_trips_documents_with_ids() {
        let (cache, layer) = layer();
        let id = ObjectId::new();
        let sig = Signature::point(&Identifier::from(id));
        let doc = Some(Document::new().with("_id", id).with("name", "x"));

        layer.set(&sig, &doc, Duration::from_secs(5)).await.unwrap();
        let raw = cache.get(&layer.key(&sig)).await.unwrap().unwrap();
        assert!(raw.contains("$oid"));

        let back: Option<Option<Document>> = layer.get(&sig).await.unwrap();
        assert_eq!(back, Some(doc));
    }

    #[tokio::test]
    async fn not_found_is_cached_as_null() {
        let (cache, layer) = layer();
        let sig = Signature::point(&Identifier::from("missing"));
        layer.set(&sig, &None::<Document>, Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get("test-missing").await.unwrap().as_deref(), Some("null"));

        let back: Option<Option<Document>> = layer.get(&sig).await.unwrap();
        assert_eq!(back, Some(None));
    }

    #[tokio::test]
    async fn corrupt_entries_surface_as_codec_errors() {
        let (cache, layer) = layer();
        let sig = Signature::point(&Identifier::from("bad"));
        cache.set("test-bad", "{not json".into(), SetOptions::default()).await.unwrap();
        let result: LoaderResult<Option<Vec<Document>>> = layer.get(&sig).await;
        assert!(matches!(result, Err(LoaderError::Codec(_))));
    }

    #[tokio::test]
    async fn disabled_layer_is_inert() {
        let layer = CacheLayer::new("test", None);
        let sig = Signature::point(&Identifier::from("a"));
        layer.set(&sig, &Vec::<Document>::new(), Duration::from_secs(1)).await.unwrap();
        let back: Option<Vec<Document>> = layer.get(&sig).await.unwrap();
        assert!(back.is_none());
        assert!(!layer.delete(&sig).await.unwrap());
    }
}
