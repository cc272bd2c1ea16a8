//! Per-tick request coalescing.
//!
//! Requests enqueued while a window is open share one store query. The
//! first request of a window spawns a dispatcher task that yields to the
//! scheduler `dispatch_yields` times, then takes the window, merges every
//! request into one filter, runs it and hands each request its own slice of
//! the result.
//!
//! Requests with the same [`Signature`] share one slot until their result
//! is delivered. On a multi-threaded runtime the dispatcher may run in
//! parallel with the enqueuing task, so coalescing is only guaranteed for
//! requests enqueued without an intervening suspension point.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use docbatch_store::QuerySource;
use docbatch_types::Document;

use crate::config::LoaderConfig;
use crate::demux::demux;
use crate::error::{LoaderError, LoaderResult};
use crate::merge::merge_filters;
use crate::request::{LookupRequest, ResolvedLookup};
use crate::signature::Signature;

/// Documents resolved for one request, shared by every caller that asked.
pub type Documents = Arc<Vec<Document>>;

type Outcome = LoaderResult<Documents>;

struct Slot {
    signature: Signature,
    lookup: ResolvedLookup,
    result: watch::Sender<Option<Outcome>>,
}

struct Window {
    id: u64,
    slots: Vec<Slot>,
}

/// A signature waiting on a window, dispatched or not.
struct Pending {
    window: u64,
    result: watch::Receiver<Option<Outcome>>,
}

#[derive(Default)]
struct State {
    open: Option<Window>,
    sealed: HashMap<u64, Window>,
    next_window: u64,
    pending: HashMap<Signature, Pending>,
    memo: HashMap<Signature, Documents>,
}

struct Shared {
    source: QuerySource,
    config: LoaderConfig,
    state: Mutex<State>,
}

/// Collects requests into windows and resolves each window with one query.
///
/// Cheap to clone; clones share windows, pending requests and the memo.
#[derive(Clone)]
pub struct BatchCoordinator {
    shared: Arc<Shared>,
}

impl BatchCoordinator {
    pub fn new(source: QuerySource, config: LoaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn source(&self) -> &QuerySource {
        &self.shared.source
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    /// Register `request` with the current window.
    ///
    /// Joins an identical pending request if there is one, otherwise adds a
    /// slot, opening a window first if none is open. Never suspends; the
    /// returned handle resolves once the window has been dispatched.
    pub fn enqueue(&self, request: &LookupRequest) -> LoaderResult<PendingLoad> {
        let signature = request.signature();
        let mut state = self.shared.state.lock().expect("lock poisoned");

        if let Some(documents) = state.memo.get(&signature) {
            trace!(%signature, "memo hit");
            return Ok(PendingLoad::ready(documents.clone()));
        }
        if let Some(pending) = state.pending.get(&signature) {
            trace!(%signature, window = pending.window, "joined pending request");
            return Ok(PendingLoad::waiting(pending.result.clone()));
        }

        let mut window = match state.open.take() {
            Some(window) => window,
            None => self.open_window(&mut state)?,
        };
        let (result, receiver) = watch::channel(None);
        state.pending.insert(
            signature.clone(),
            Pending {
                window: window.id,
                result: receiver.clone(),
            },
        );
        trace!(%signature, window = window.id, "enqueued");
        window.slots.push(Slot {
            signature,
            lookup: request.resolve(&self.shared.config),
            result,
        });

        let full = self
            .shared
            .config
            .max_batch_size
            .is_some_and(|max| window.slots.len() >= max);
        if full {
            debug!(window = window.id, requests = window.slots.len(), "window full, sealing");
            state.sealed.insert(window.id, window);
        } else {
            state.open = Some(window);
        }
        Ok(PendingLoad::waiting(receiver))
    }

    fn open_window(&self, state: &mut State) -> LoaderResult<Window> {
        let runtime = Handle::try_current().map_err(|_| LoaderError::NoRuntime)?;
        let id = state.next_window;
        state.next_window += 1;
        runtime.spawn(self.clone().run_window(id));
        trace!(window = id, "window opened");
        Ok(Window {
            id,
            slots: Vec::new(),
        })
    }

    /// Forget the pending entry and memoized result for `signature`.
    ///
    /// Callers already waiting keep their handles and still get the result;
    /// the next request with this signature starts a fresh slot.
    pub fn clear(&self, signature: &Signature) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        state.pending.remove(signature);
        state.memo.remove(signature);
    }

    /// [`clear`](Self::clear) every signature.
    pub fn clear_all(&self) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        state.pending.clear();
        state.memo.clear();
    }

    /// Signatures currently waiting on a window.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().expect("lock poisoned").pending.len()
    }

    pub fn memo_len(&self) -> usize {
        self.shared.state.lock().expect("lock poisoned").memo.len()
    }

    /// The guard is created before the task is first polled, so a task
    /// dropped unpolled (runtime shutdown) still discards its window.
    fn run_window(self, id: u64) -> impl Future<Output = ()> + Send + 'static {
        let guard = WindowGuard {
            shared: self.shared.clone(),
            window: id,
            armed: true,
        };
        async move {
            for _ in 0..self.shared.config.dispatch_yields {
                tokio::task::yield_now().await;
            }
            let window = {
                let mut state = self.shared.state.lock().expect("lock poisoned");
                if state.open.as_ref().is_some_and(|w| w.id == id) {
                    state.open.take()
                } else {
                    state.sealed.remove(&id)
                }
            };
            if let Some(window) = window {
                self.dispatch(window).await;
            }
            guard.disarm();
        }
    }

    async fn dispatch(&self, window: Window) {
        let Window { id, slots } = window;
        let (lookups, deliveries): (Vec<_>, Vec<_>) = slots
            .into_iter()
            .map(|slot| (slot.lookup, (slot.signature, slot.result)))
            .unzip();

        let filter = merge_filters(&lookups);
        let collection = self.shared.source.name();
        debug!(
            collection,
            window = id,
            requests = lookups.len(),
            groups = filter.groups().len(),
            "dispatching batch"
        );

        let outcomes: Vec<Outcome> = match self.shared.source.find(&filter).await {
            Ok(documents) => {
                debug!(collection, window = id, documents = documents.len(), "batch resolved");
                demux(&lookups, &documents)
                    .into_iter()
                    .map(|matched| Ok(Arc::new(matched)))
                    .collect()
            }
            Err(err) => {
                warn!(collection, window = id, error = %err, "batch query failed");
                let err = LoaderError::from(err);
                deliveries.iter().map(|_| Err(err.clone())).collect()
            }
        };

        let mut state = self.shared.state.lock().expect("lock poisoned");
        for ((signature, result), outcome) in deliveries.into_iter().zip(outcomes) {
            // A cleared signature must not be memoized or unregistered here;
            // a newer request may already own the entry.
            if state.pending.get(&signature).is_some_and(|p| p.window == id) {
                state.pending.remove(&signature);
                if let (true, Ok(documents)) = (self.shared.config.memoize, &outcome) {
                    state.memo.insert(signature, documents.clone());
                }
            }
            result.send_replace(Some(outcome));
        }
    }
}

/// Discards a window whose dispatcher ended without delivering: the store
/// future panicked or the task was dropped.
///
/// Pending entries registered by the window are removed so later requests
/// start a fresh slot, and an undispatched window is dropped so its waiters
/// observe [`LoaderError::WindowDropped`] instead of hanging.
struct WindowGuard {
    shared: Arc<Shared>,
    window: u64,
    armed: bool,
}

impl WindowGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WindowGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // May run while unwinding; a poisoned lock must not panic again.
        let mut state = match self.shared.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = self.window;
        state.pending.retain(|_, pending| pending.window != id);
        if state.open.as_ref().is_some_and(|w| w.id == id) {
            state.open = None;
        }
        state.sealed.remove(&id);
        warn!(window = id, "batch window discarded without delivering results");
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("source", &self.shared.source)
            .field("pending", &self.pending_len())
            .field("memoized", &self.memo_len())
            .finish()
    }
}

enum PendingState {
    Ready(Documents),
    Waiting(watch::Receiver<Option<Outcome>>),
}

/// Handle to the result of an enqueued request. Await it directly or via
/// [`PendingLoad::wait`].
pub struct PendingLoad {
    state: PendingState,
}

impl PendingLoad {
    fn ready(documents: Documents) -> Self {
        Self {
            state: PendingState::Ready(documents),
        }
    }

    fn waiting(result: watch::Receiver<Option<Outcome>>) -> Self {
        Self {
            state: PendingState::Waiting(result),
        }
    }

    /// Returns `true` if the result is already available.
    pub fn is_ready(&self) -> bool {
        match &self.state {
            PendingState::Ready(_) => true,
            PendingState::Waiting(result) => result.borrow().is_some(),
        }
    }

    pub async fn wait(self) -> LoaderResult<Documents> {
        match self.state {
            PendingState::Ready(documents) => Ok(documents),
            PendingState::Waiting(mut result) => {
                let settled = result
                    .wait_for(Option::is_some)
                    .await
                    .ok()
                    .and_then(|value| value.clone());
                settled.unwrap_or(Err(LoaderError::WindowDropped))
            }
        }
    }
}

impl IntoFuture for PendingLoad {
    type Output = LoaderResult<Documents>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl std::fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLoad")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Fields;
    use docbatch_store::{InMemoryCollection, StoreError};
    use docbatch_types::{ObjectId, Value};
    use std::time::Duration;

    fn setup(docs: Vec<Document>, config: LoaderConfig) -> (Arc<InMemoryCollection>, BatchCoordinator) {
        let collection = Arc::new(InMemoryCollection::with_documents("test", docs));
        let source = QuerySource::RawCollection(collection.clone());
        (collection, BatchCoordinator::new(source, config))
    }

    fn id_doc(id: ObjectId) -> Document {
        Document::new().with("_id", id)
    }

    #[tokio::test]
    async fn distinct_points_share_one_query() {
        let ids: Vec<ObjectId> = (0..3).map(|_| ObjectId::new()).collect();
        let (collection, coordinator) =
            setup(ids.iter().map(|id| id_doc(*id)).collect(), LoaderConfig::default());

        let pending: Vec<PendingLoad> = ids
            .iter()
            .map(|id| coordinator.enqueue(&LookupRequest::point(*id)).unwrap())
            .collect();
        for (id, load) in ids.iter().zip(pending) {
            let docs = load.await.unwrap();
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].get("_id"), Some(&Value::ObjectId(*id)));
        }
        assert_eq!(collection.query_count(), 1);
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[tokio::test]
    async fn identical_requests_share_a_slot() {
        let id = ObjectId::new();
        let (collection, coordinator) = setup(vec![id_doc(id)], LoaderConfig::default());

        let a = coordinator.enqueue(&LookupRequest::point(id)).unwrap();
        let b = coordinator.enqueue(&LookupRequest::point(id.to_hex())).unwrap();
        assert_eq!(coordinator.pending_len(), 1);

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(collection.query_count(), 1);
        assert_eq!(collection.queries()[0].groups()[0]["_id"].within.len(), 1);
    }

    #[tokio::test]
    async fn later_windows_query_again() {
        let id = ObjectId::new();
        let (collection, coordinator) = setup(vec![id_doc(id)], LoaderConfig::default());

        coordinator.enqueue(&LookupRequest::point(id)).unwrap().await.unwrap();
        coordinator.enqueue(&LookupRequest::point(id)).unwrap().await.unwrap();
        assert_eq!(collection.query_count(), 2);
    }

    #[tokio::test]
    async fn shapes_do_not_contaminate_each_other() {
        let docs = vec![
            Document::new().with("_id", "1").with("foo", "bar"),
            Document::new().with("_id", "2").with("tags", vec!["baz"]),
        ];
        let (collection, coordinator) = setup(docs, LoaderConfig::default());

        let foo = coordinator
            .enqueue(&LookupRequest::fields(Fields::new().field("foo", "bar")))
            .unwrap();
        let tags = coordinator
            .enqueue(&LookupRequest::fields(Fields::new().field("tags", "baz")))
            .unwrap();
        let (foo, tags) = (foo.await.unwrap(), tags.await.unwrap());

        assert_eq!(foo.len(), 1);
        assert_eq!(foo[0].get("_id"), Some(&Value::from("1")));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].get("_id"), Some(&Value::from("2")));
        assert_eq!(collection.query_count(), 1);
        assert_eq!(collection.queries()[0].groups().len(), 2);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter() {
        let (collection, coordinator) = setup(vec![], LoaderConfig::default());
        collection.set_failure(Some("connection reset".into()));

        let a = coordinator.enqueue(&LookupRequest::point("a")).unwrap();
        let b = coordinator.enqueue(&LookupRequest::point("b")).unwrap();
        for load in [a, b] {
            match load.await {
                Err(LoaderError::Store(err)) => assert_eq!(
                    *err,
                    StoreError::QueryFailed {
                        collection: "test".into(),
                        reason: "connection reset".into()
                    }
                ),
                other => panic!("expected store error, got {other:?}"),
            }
        }
        assert_eq!(collection.query_count(), 1);
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[tokio::test]
    async fn memoized_results_skip_the_store() {
        let id = ObjectId::new();
        let (collection, coordinator) =
            setup(vec![id_doc(id)], LoaderConfig::default().with_memoize(true));
        let request = LookupRequest::point(id);

        coordinator.enqueue(&request).unwrap().await.unwrap();
        let again = coordinator.enqueue(&request).unwrap();
        assert!(again.is_ready());
        assert_eq!(again.await.unwrap().len(), 1);
        assert_eq!(collection.query_count(), 1);

        coordinator.clear(&request.signature());
        coordinator.enqueue(&request).unwrap().await.unwrap();
        assert_eq!(collection.query_count(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_memoized() {
        let (collection, coordinator) = setup(vec![], LoaderConfig::default().with_memoize(true));
        collection.set_failure(Some("down".into()));
        assert!(coordinator.enqueue(&LookupRequest::point("a")).unwrap().await.is_err());
        assert_eq!(coordinator.memo_len(), 0);
    }

    #[tokio::test]
    async fn cleared_signature_is_not_memoized() {
        let (_, coordinator) = setup(vec![], LoaderConfig::default().with_memoize(true));
        let request = LookupRequest::point("a");

        let pending = coordinator.enqueue(&request).unwrap();
        coordinator.clear(&request.signature());
        assert!(pending.await.unwrap().is_empty());
        assert_eq!(coordinator.memo_len(), 0);
    }

    #[tokio::test]
    async fn clear_while_pending_starts_a_fresh_slot() {
        let id = ObjectId::new();
        let (collection, coordinator) = setup(vec![id_doc(id)], LoaderConfig::default());
        let request = LookupRequest::point(id);

        let first = coordinator.enqueue(&request).unwrap();
        coordinator.clear(&request.signature());
        let second = coordinator.enqueue(&request).unwrap();

        assert_eq!(first.await.unwrap().len(), 1);
        assert_eq!(second.await.unwrap().len(), 1);
        assert_eq!(collection.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn joins_a_dispatched_request() {
        let id = ObjectId::new();
        let collection = Arc::new(
            InMemoryCollection::with_documents("test", vec![id_doc(id)])
                .with_latency(Duration::from_millis(50)),
        );
        let coordinator = BatchCoordinator::new(
            QuerySource::RawCollection(collection.clone()),
            LoaderConfig::default(),
        );

        let first = coordinator.enqueue(&LookupRequest::point(id)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(collection.query_count(), 1);

        let second = coordinator.enqueue(&LookupRequest::point(id)).unwrap();
        assert_eq!(first.await.unwrap().len(), 1);
        assert_eq!(second.await.unwrap().len(), 1);
        assert_eq!(collection.query_count(), 1);
    }

    #[tokio::test]
    async fn full_windows_dispatch_separately() {
        let (collection, coordinator) =
            setup(vec![], LoaderConfig::default().with_max_batch_size(2));
        let loads: Vec<PendingLoad> = ["a", "b", "c"]
            .iter()
            .map(|id| coordinator.enqueue(&LookupRequest::point(*id)).unwrap())
            .collect();
        for load in loads {
            load.await.unwrap();
        }
        assert_eq!(collection.query_count(), 2);
    }

    struct PanicsOnce {
        inner: InMemoryCollection,
        tripped: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl docbatch_store::ModelHandle for PanicsOnce {
        fn collection_name(&self) -> &str {
            "flaky"
        }

        async fn find_lean(
            &self,
            filter: &docbatch_store::Filter,
        ) -> docbatch_store::StoreResult<Vec<Document>> {
            use docbatch_store::RawCollection;
            if !self.tripped.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("driver crashed");
            }
            self.inner.find(filter).await
        }
    }

    #[tokio::test]
    async fn panicking_store_discards_the_window() {
        let model = PanicsOnce {
            inner: InMemoryCollection::with_documents(
                "flaky",
                vec![Document::new().with("_id", "1")],
            ),
            tripped: std::sync::atomic::AtomicBool::new(false),
        };
        let coordinator = BatchCoordinator::new(QuerySource::model(model), LoaderConfig::default());
        let request = LookupRequest::point("1");

        let first = coordinator.enqueue(&request).unwrap().await;
        assert!(matches!(first, Err(LoaderError::WindowDropped)));
        assert_eq!(coordinator.pending_len(), 0);

        let second = coordinator.enqueue(&request).unwrap().await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn dropped_runtime_discards_undispatched_window() {
        let (_, coordinator) = setup(vec![], LoaderConfig::default());
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let pending = {
            let _enter = runtime.enter();
            coordinator.enqueue(&LookupRequest::point("a")).unwrap()
        };
        assert_eq!(coordinator.pending_len(), 1);

        drop(runtime);
        assert_eq!(coordinator.pending_len(), 0);

        let fresh = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let outcome = fresh.block_on(pending.wait());
        assert!(matches!(outcome, Err(LoaderError::WindowDropped)));
    }

    #[test]
    fn enqueue_outside_runtime_fails() {
        let (_, coordinator) = setup(vec![], LoaderConfig::default());
        assert!(matches!(
            coordinator.enqueue(&LookupRequest::point("a")),
            Err(LoaderError::NoRuntime)
        ));
    }
}
