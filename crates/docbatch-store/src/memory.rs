use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use docbatch_types::Document;

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::source::RawCollection;

/// In-memory, `Vec`-backed collection.
///
/// Intended for tests and embedding. Every executed filter is recorded so
/// callers can assert how many queries reached the store and what they
/// asked for. An optional latency turns each query into a real suspension
/// point, and an injected failure makes every query reject.
pub struct InMemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    queries: RwLock<Vec<Filter>>,
    query_count: AtomicUsize,
    latency: Option<Duration>,
    failure: RwLock<Option<String>>,
}

impl InMemoryCollection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            queries: RwLock::new(Vec::new()),
            query_count: AtomicUsize::new(0),
            latency: None,
            failure: RwLock::new(None),
        }
    }

    /// Create a collection holding `documents`.
    pub fn with_documents(name: impl Into<String>, documents: Vec<Document>) -> Self {
        let collection = Self::new(name);
        *collection.documents.write().expect("lock poisoned") = documents;
        collection
    }

    /// Sleep for `latency` inside every query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a document.
    pub fn insert(&self, doc: Document) {
        self.documents.write().expect("lock poisoned").push(doc);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().expect("lock poisoned").is_empty()
    }

    /// Make every subsequent query fail with `reason`, or succeed again
    /// with `None`.
    pub fn set_failure(&self, reason: Option<String>) {
        *self.failure.write().expect("lock poisoned") = reason;
    }

    /// Number of queries executed so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Filters received so far, in execution order.
    pub fn queries(&self) -> Vec<Filter> {
        self.queries.read().expect("lock poisoned").clone()
    }

    /// Forget recorded queries and reset the counter.
    pub fn reset_queries(&self) {
        self.queries.write().expect("lock poisoned").clear();
        self.query_count.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RawCollection for InMemoryCollection {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        self.queries
            .write()
            .expect("lock poisoned")
            .push(filter.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failure.read().expect("lock poisoned").clone();
        if let Some(reason) = failure {
            return Err(StoreError::QueryFailed {
                collection: self.name.clone(),
                reason,
            });
        }

        let docs = self.documents.read().expect("lock poisoned");
        let matched: Vec<Document> = docs.iter().filter(|d| filter.matches(d)).cloned().collect();
        trace!(collection = %self.name, %filter, matched = matched.len(), "in-memory query");
        Ok(matched)
    }
}

impl std::fmt::Debug for InMemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCollection")
            .field("name", &self.name)
            .field("document_count", &self.len())
            .field("query_count", &self.query_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ClauseSet, FieldClause};
    use docbatch_types::Value;

    fn by_foo(value: &str) -> Filter {
        let mut clauses = ClauseSet::new();
        clauses.insert("foo".into(), FieldClause::new(vec![Value::from(value)]));
        Filter::Clauses(clauses)
    }

    fn collection() -> InMemoryCollection {
        InMemoryCollection::with_documents(
            "test",
            vec![
                Document::new().with("_id", "1").with("foo", "bar"),
                Document::new().with("_id", "2").with("foo", "bar"),
                Document::new().with("_id", "3").with("foo", "baz"),
            ],
        )
    }

    #[tokio::test]
    async fn find_returns_matches_in_insertion_order() {
        let c = collection();
        let found = c.find(&by_foo("bar")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].get("_id"), Some(&Value::from("1")));
        assert_eq!(found[1].get("_id"), Some(&Value::from("2")));
    }

    #[tokio::test]
    async fn records_queries() {
        let c = collection();
        c.find(&by_foo("bar")).await.unwrap();
        c.find(&by_foo("baz")).await.unwrap();
        assert_eq!(c.query_count(), 2);
        assert_eq!(c.queries()[1], by_foo("baz"));

        c.reset_queries();
        assert_eq!(c.query_count(), 0);
        assert!(c.queries().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_rejects_queries() {
        let c = collection();
        c.set_failure(Some("boom".into()));
        let err = c.find(&Filter::all()).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::QueryFailed {
                collection: "test".into(),
                reason: "boom".into()
            }
        );
        assert_eq!(c.query_count(), 1);

        c.set_failure(None);
        assert_eq!(c.find(&Filter::all()).await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_suspends_the_query() {
        let c = collection().with_latency(Duration::from_millis(50));
        let start = tokio::time::Instant::now();
        c.find(&Filter::all()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn insert_and_len() {
        let c = InMemoryCollection::new("empty");
        assert!(c.is_empty());
        c.insert(Document::new().with("_id", "x"));
        assert_eq!(c.len(), 1);
    }
}
