//! Watched queries.
//!
//! An [`ObservableQuery`] keeps one operation's data current. It is
//! registered on the cache and re-reads whenever a field it depends on
//! changes. When that re-read finds the data complete it is published as-is
//! and `loading` is left untouched; when the re-read comes back incomplete
//! the query issues its own network request, publishing `loading = true`
//! with [`NetworkStatus::Refetch`] until the response has been written.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::cache::{CacheWatcher, ChangeSet, FieldKey, InMemoryCache, WatchRegistration};
use crate::client::{ClientInner, ProbeClient};
use crate::document::Document;
use crate::error::ClientError;

/// Where a watched query is in its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// First request in flight, nothing to show yet.
    Loading,
    /// Request in flight on behalf of data that is already shown.
    Refetch,
    Ready,
    Error,
}

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub data: Option<Value>,
    pub loading: bool,
    pub network_status: NetworkStatus,
    pub error: Option<String>,
}

impl QueryState {
    const fn loading() -> Self {
        Self {
            data: None,
            loading: true,
            network_status: NetworkStatus::Loading,
            error: None,
        }
    }

    /// Short event-log line for this state.
    #[must_use]
    pub fn describe(&self, operation: &str) -> String {
        format!("loading `{operation}`: {}", self.loading)
    }

    /// Deserialize `data` into an operation's response type.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoData` without data and `ClientError::Parse` if
    /// the data does not fit `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let data = self.data.clone().ok_or(ClientError::NoData)?;
        Ok(serde_json::from_value(data)?)
    }
}

/// Number of states a watch remembers; older ones are dropped first.
pub const HISTORY_LIMIT: usize = 64;

/// Shared half of a watched query, held by the cache and the client.
pub(crate) struct QueryWatch {
    me: Weak<Self>,
    client: Weak<ClientInner>,
    document: Arc<Document>,
    variables: Mutex<Value>,
    dependencies: Mutex<HashSet<FieldKey>>,
    /// Requests this watch has on the wire. Cache changes are ignored
    /// while any is pending.
    in_flight: AtomicUsize,
    /// Bumped per request; only the newest one publishes its outcome.
    generation: AtomicU64,
    state: watch::Sender<QueryState>,
    history: Mutex<VecDeque<QueryState>>,
}

impl QueryWatch {
    pub(crate) fn new(
        client: &Arc<ClientInner>,
        document: Arc<Document>,
        variables: Value,
    ) -> (Arc<Self>, watch::Receiver<QueryState>) {
        let (state, receiver) = watch::channel(QueryState::loading());
        let watch = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            client: Arc::downgrade(client),
            document,
            variables: Mutex::new(variables),
            dependencies: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            state,
            history: Mutex::new(VecDeque::new()),
        });
        (watch, receiver)
    }

    pub(crate) fn operation_name(&self) -> Option<&str> {
        self.document.operation_name()
    }

    pub(crate) fn document(&self) -> &Document {
        &self.document
    }

    pub(crate) fn variables(&self) -> Value {
        lock(&self.variables).clone()
    }

    fn current(&self) -> QueryState {
        self.state.borrow().clone()
    }

    /// Publish `next` if it differs from the current state.
    fn publish(&self, next: QueryState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if changed {
            tracing::debug!(
                operation = self.operation_name(),
                loading = next.loading,
                status = ?next.network_status,
                "query state changed"
            );
            self.record(next);
        }
    }

    fn record(&self, state: QueryState) {
        let mut history = lock(&self.history);
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(state);
    }

    /// Re-read from the cache, remembering what the read depended on.
    fn read(&self, cache: &InMemoryCache) -> crate::cache::Diff {
        let diff = cache.diff(&self.document, &self.variables());
        *lock(&self.dependencies) = diff.dependencies.clone();
        diff
    }

    /// Publish what the cache holds right now, keeping the loading flag.
    ///
    /// Returns whether the cached data was complete.
    pub(crate) fn publish_from_cache(&self, cache: &InMemoryCache) -> bool {
        let diff = self.read(cache);
        if diff.complete {
            self.publish(QueryState {
                data: Some(diff.result),
                ..self.current()
            });
        }
        diff.complete
    }

    /// Publish cached data as a finished load, if the cache has all of it.
    pub(crate) fn ready_from_cache(&self, cache: &InMemoryCache) -> bool {
        let diff = self.read(cache);
        if diff.complete {
            self.publish(QueryState {
                data: Some(diff.result),
                loading: false,
                network_status: NetworkStatus::Ready,
                error: None,
            });
        }
        diff.complete
    }

    /// Publish the in-flight state. A first load matches the initial state,
    /// so it is only recorded in the history.
    fn begin_request(&self, status: NetworkStatus) {
        let current = self.current();
        let next = QueryState {
            data: current.data.clone(),
            loading: true,
            network_status: status,
            error: None,
        };
        if next == current {
            if lock(&self.history).is_empty() {
                self.record(next);
            }
        } else {
            self.publish(next);
        }
    }

    /// Send the operation and publish the outcome.
    pub(crate) async fn fetch(
        &self,
        client: &ProbeClient,
        status: NetworkStatus,
    ) -> Result<QueryState, ClientError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.fetch_claimed(client, status).await
    }

    /// [`fetch`](Self::fetch) for a caller that already counted itself in
    /// `in_flight`. The count is released when this returns or is dropped.
    async fn fetch_claimed(
        &self,
        client: &ProbeClient,
        status: NetworkStatus,
    ) -> Result<QueryState, ClientError> {
        let pending = Pending(&self.in_flight);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.begin_request(status);

        let variables = self.variables();
        let result = client.fetch_and_store(&self.document, &variables).await;
        drop(pending);

        if self.generation.load(Ordering::SeqCst) != generation {
            // A newer request owns the loading state. Show what this one
            // wrote, without falling back to its raw data.
            tracing::debug!(operation = self.operation_name(), "request superseded");
            return result.map(|_| {
                self.publish_from_cache(client.cache());
                self.current()
            });
        }

        match result {
            Ok(network_data) => {
                let diff = self.read(client.cache());
                let data = if diff.complete { diff.result } else { network_data };
                let state = QueryState {
                    data: Some(data),
                    loading: false,
                    network_status: NetworkStatus::Ready,
                    error: None,
                };
                self.publish(state.clone());
                Ok(state)
            }
            Err(error) => {
                tracing::warn!(
                    operation = self.operation_name(),
                    error = %error,
                    "watched query request failed"
                );
                self.publish(QueryState {
                    data: self.current().data,
                    loading: false,
                    network_status: NetworkStatus::Error,
                    error: Some(error.to_string()),
                });
                Err(error)
            }
        }
    }

    fn spawn_refetch(&self) {
        let (Some(watch), Some(inner)) = (self.me.upgrade(), self.client.upgrade()) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                operation = self.operation_name(),
                "no async runtime; cannot refetch incomplete query"
            );
            return;
        };
        // Only start when nothing else is on the wire for this watch.
        if self
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.publish(QueryState {
            loading: true,
            network_status: NetworkStatus::Refetch,
            error: None,
            ..self.current()
        });
        let client = ProbeClient::from_inner(inner);
        runtime.spawn(async move {
            let _ = watch.fetch_claimed(&client, NetworkStatus::Refetch).await;
        });
    }
}

/// One counted request; uncounts itself on drop.
struct Pending<'a>(&'a AtomicUsize);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CacheWatcher for QueryWatch {
    fn cache_changed(&self, cache: &InMemoryCache, changes: &ChangeSet) {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return;
        }
        if !changes.touches(&lock(&self.dependencies)) {
            return;
        }
        if !self.publish_from_cache(cache) {
            tracing::debug!(
                operation = self.operation_name(),
                "watched query became incomplete; refetching"
            );
            self.spawn_refetch();
        }
    }
}

/// Handle to a watched query. Dropping it stops the watch.
pub struct ObservableQuery {
    watch: Arc<QueryWatch>,
    receiver: watch::Receiver<QueryState>,
    client: ProbeClient,
    _registration: WatchRegistration,
}

impl std::fmt::Debug for ObservableQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableQuery")
            .field("operation", &self.operation_name())
            .field("state", &*self.receiver.borrow())
            .finish_non_exhaustive()
    }
}

impl ObservableQuery {
    pub(crate) fn new(
        watch: Arc<QueryWatch>,
        receiver: watch::Receiver<QueryState>,
        client: ProbeClient,
        registration: WatchRegistration,
    ) -> Self {
        Self {
            watch,
            receiver,
            client,
            _registration: registration,
        }
    }

    pub(crate) fn watch(&self) -> &Arc<QueryWatch> {
        &self.watch
    }

    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        self.watch.operation_name()
    }

    #[must_use]
    pub fn variables(&self) -> Value {
        self.watch.variables()
    }

    /// The latest published state.
    #[must_use]
    pub fn current(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    /// States published so far, oldest first, up to the last
    /// [`HISTORY_LIMIT`].
    #[must_use]
    pub fn history(&self) -> Vec<QueryState> {
        lock(&self.watch.history).iter().cloned().collect()
    }

    /// Wait for the next published state.
    ///
    /// Intermediate states published in quick succession may be skipped;
    /// [`history`](Self::history) keeps them.
    pub async fn changed(&mut self) -> Option<QueryState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<QueryState>
    where
        F: FnMut(&QueryState) -> bool,
    {
        self.receiver
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }

    /// Send the operation again, optionally with new variables.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the request fails; the failure is also
    /// published as an error state.
    #[tracing::instrument(skip(self), fields(operation = self.operation_name()))]
    pub async fn refetch(&self, variables: Option<Value>) -> Result<QueryState, ClientError> {
        if let Some(variables) = variables {
            *lock(&self.watch.variables) = variables;
        }
        self.watch.fetch(&self.client, NetworkStatus::Refetch).await
    }
}

impl Drop for ObservableQuery {
    fn drop(&mut self) {
        tracing::debug!(operation = self.operation_name(), "stopped watching query");
        self.client.forget_watch(&self.watch);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
