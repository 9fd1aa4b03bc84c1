//! The GraphQL client: transport, cache and watched queries together.
//!
//! Operations can be sent untyped (GraphQL text plus `serde_json` variables)
//! or typed through `graphql_client` generated operations; both go through
//! the same cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use graphql_client::GraphQLQuery;
use serde_json::Value;
use tokio::sync::watch;
use tracing::instrument;

use crate::cache::{InMemoryCache, TypePolicies};
use crate::config::ClientConfig;
use crate::document::{Document, OperationKind};
use crate::error::ClientError;
use crate::observable::{NetworkStatus, ObservableQuery, QueryWatch};
use crate::transport::Transport;

/// How a query consults the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Answer from the cache when complete, otherwise fetch and cache.
    #[default]
    CacheFirst,
    /// Always fetch, then cache.
    NetworkOnly,
    /// Never fetch; fail when the cache is incomplete.
    CacheOnly,
    /// Always fetch and leave the cache alone.
    NoCache,
}

type UpdateFn = Box<dyn FnOnce(&InMemoryCache, &Value) + Send>;
type QueryReducer = Box<dyn Fn(Value, &Value) -> Option<Value> + Send + Sync>;

/// Cache follow-ups for a mutation.
///
/// Applied in order once the result has been written under `ROOT_MUTATION`:
/// the `update` callback, then the `update_queries` reducers (each written
/// back through merge functions), then `refetch_queries`.
#[derive(Default)]
pub struct MutationOptions {
    update: Option<UpdateFn>,
    update_queries: Vec<(String, QueryReducer)>,
    refetch_queries: Vec<String>,
}

impl std::fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationOptions")
            .field("update", &self.update.is_some())
            .field(
                "update_queries",
                &self.update_queries.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("refetch_queries", &self.refetch_queries)
            .finish()
    }
}

impl MutationOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch the cache directly with the mutation's data.
    #[must_use]
    pub fn update<F>(mut self, update: F) -> Self
    where
        F: FnOnce(&InMemoryCache, &Value) + Send + 'static,
    {
        self.update = Some(Box::new(update));
        self
    }

    /// Rewrite the data of every watched query named `operation`.
    ///
    /// The reducer receives the query's current data and the mutation's
    /// data; returning `None` leaves the query alone.
    #[must_use]
    pub fn update_query<F>(mut self, operation: &str, reducer: F) -> Self
    where
        F: Fn(Value, &Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.update_queries
            .push((operation.to_string(), Box::new(reducer)));
        self
    }

    /// Refetch every watched query named `operation` afterwards.
    #[must_use]
    pub fn refetch_query(mut self, operation: &str) -> Self {
        self.refetch_queries.push(operation.to_string());
        self
    }
}

/// GraphQL client with a normalized cache. Cheap to clone.
#[derive(Clone)]
pub struct ProbeClient {
    inner: Arc<ClientInner>,
}

type SharedOutcome = Option<Result<Value, Arc<ClientError>>>;

pub(crate) struct ClientInner {
    transport: Transport,
    cache: InMemoryCache,
    /// One parse per distinct (source, operation name), kept for the life of
    /// the client. Applications send a fixed set of operations, so this is
    /// bounded by the operations they define.
    documents: Mutex<HashMap<(String, Option<String>), Arc<Document>>>,
    watches: Mutex<BTreeMap<usize, Weak<QueryWatch>>>,
    /// Cache-writing requests currently on the wire, keyed by
    /// [`request_key`]. Entries are removed when the request settles.
    in_flight: Mutex<HashMap<String, watch::Receiver<SharedOutcome>>>,
}

impl std::fmt::Debug for ProbeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeClient")
            .field("endpoint", &self.inner.transport.endpoint().as_str())
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl ProbeClient {
    /// Create a client for the configured endpoint.
    #[must_use]
    pub fn new(config: &ClientConfig, policies: TypePolicies) -> Self {
        Self::from_inner(Arc::new(ClientInner {
            transport: Transport::new(config.endpoint.clone()),
            cache: InMemoryCache::new(policies),
            documents: Mutex::new(HashMap::new()),
            watches: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }))
    }

    pub(crate) const fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn cache(&self) -> &InMemoryCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Parse `source`, reusing earlier parses of the same operation.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Document` if the text cannot be parsed or the
    /// operation cannot be selected.
    pub fn document(
        &self,
        source: &str,
        operation_name: Option<&str>,
    ) -> Result<Arc<Document>, ClientError> {
        let key = (source.to_string(), operation_name.map(String::from));
        if let Some(doc) = lock(&self.inner.documents).get(&key) {
            return Ok(Arc::clone(doc));
        }
        let doc = Arc::new(Document::parse(source, operation_name)?);
        lock(&self.inner.documents).insert(key, Arc::clone(&doc));
        Ok(doc)
    }

    /// Run a query once.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` on network, GraphQL, document or cache
    /// failures, and `ClientError::NotCached` for incomplete `CacheOnly`
    /// reads.
    #[instrument(skip(self, source, variables))]
    pub async fn query(
        &self,
        source: &str,
        operation_name: Option<&str>,
        variables: Value,
        fetch_policy: FetchPolicy,
    ) -> Result<Value, ClientError> {
        let doc = self.document(source, operation_name)?;
        match fetch_policy {
            FetchPolicy::CacheFirst => match self.cache().read_query(&doc, &variables) {
                Some(data) => {
                    tracing::debug!("answered from cache");
                    Ok(data)
                }
                None => self.fetch_and_store(&doc, &variables).await,
            },
            FetchPolicy::NetworkOnly => self.fetch_and_store(&doc, &variables).await,
            FetchPolicy::CacheOnly => {
                let diff = self.cache().diff(&doc, &variables);
                if diff.complete {
                    Ok(diff.result)
                } else {
                    Err(ClientError::NotCached(diff.missing))
                }
            }
            FetchPolicy::NoCache => {
                self.inner
                    .transport
                    .execute(doc.transport_source(), doc.operation_name(), &variables)
                    .await
            }
        }
    }

    /// Run a mutation and apply its cache follow-ups.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` on network, GraphQL, document or cache
    /// failures. Refetch failures are published on the affected watched
    /// queries instead.
    #[instrument(skip(self, source, variables, options))]
    pub async fn mutate(
        &self,
        source: &str,
        operation_name: Option<&str>,
        variables: Value,
        options: MutationOptions,
    ) -> Result<Value, ClientError> {
        let doc = self.document(source, operation_name)?;
        if doc.kind() != OperationKind::Mutation {
            tracing::warn!("mutate called with a non-mutation operation");
        }
        let data = self
            .inner
            .transport
            .execute(doc.transport_source(), doc.operation_name(), &variables)
            .await?;
        self.cache().write_query(&doc, &variables, &data)?;

        if let Some(update) = options.update {
            update(self.cache(), &data);
        }

        for (operation, reducer) in &options.update_queries {
            for watch in self.watches_named(operation) {
                let updated = self.cache().update_query(
                    watch.document(),
                    &watch.variables(),
                    |previous| reducer(previous, &data),
                )?;
                tracing::debug!(operation = %operation, updated, "applied query reducer");
            }
        }

        for operation in &options.refetch_queries {
            for watch in self.watches_named(operation) {
                let _ = watch.fetch(self, NetworkStatus::Refetch).await;
            }
        }

        Ok(data)
    }

    /// Watch a query: fetch it according to `fetch_policy`, then keep it
    /// current as the cache changes.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the initial request fails, or
    /// `ClientError::NotCached` for an incomplete `CacheOnly` watch.
    #[instrument(skip(self, source, variables))]
    pub async fn watch_query(
        &self,
        source: &str,
        operation_name: Option<&str>,
        variables: Value,
        fetch_policy: FetchPolicy,
    ) -> Result<ObservableQuery, ClientError> {
        let doc = self.document(source, operation_name)?;
        let (watch, receiver) = QueryWatch::new(&self.inner, doc, variables);
        let registration = self.cache().watch(watch.clone());
        lock(&self.inner.watches).insert(watch_key(&watch), Arc::downgrade(&watch));
        let observable = ObservableQuery::new(watch, receiver, self.clone(), registration);

        let cached = match fetch_policy {
            FetchPolicy::CacheFirst | FetchPolicy::CacheOnly => {
                observable.watch().ready_from_cache(self.cache())
            }
            FetchPolicy::NetworkOnly | FetchPolicy::NoCache => false,
        };
        if cached {
            tracing::debug!("watched query answered from cache");
        } else if fetch_policy == FetchPolicy::CacheOnly {
            let missing = self
                .cache()
                .diff(observable.watch().document(), &observable.variables())
                .missing;
            return Err(ClientError::NotCached(missing));
        } else {
            observable
                .watch()
                .fetch(self, NetworkStatus::Loading)
                .await?;
        }
        Ok(observable)
    }

    /// Typed [`query`](Self::query) over a generated operation.
    ///
    /// # Errors
    ///
    /// As [`query`](Self::query), plus `ClientError::Parse` when the data
    /// does not fit the response type.
    pub async fn query_typed<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
        fetch_policy: FetchPolicy,
    ) -> Result<Q::ResponseData, ClientError> {
        let body = Q::build_query(variables);
        let variables = serde_json::to_value(&body.variables)?;
        let data = self
            .query(body.query, Some(body.operation_name), variables, fetch_policy)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Typed [`mutate`](Self::mutate) over a generated operation.
    ///
    /// # Errors
    ///
    /// As [`mutate`](Self::mutate), plus `ClientError::Parse` when the data
    /// does not fit the response type.
    pub async fn mutate_typed<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
        options: MutationOptions,
    ) -> Result<Q::ResponseData, ClientError> {
        let body = Q::build_query(variables);
        let variables = serde_json::to_value(&body.variables)?;
        let data = self
            .mutate(body.query, Some(body.operation_name), variables, options)
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Typed [`watch_query`](Self::watch_query); read states with
    /// [`QueryState::data_as`].
    ///
    /// # Errors
    ///
    /// As [`watch_query`](Self::watch_query).
    pub async fn watch_typed<Q: GraphQLQuery>(
        &self,
        variables: Q::Variables,
        fetch_policy: FetchPolicy,
    ) -> Result<ObservableQuery, ClientError> {
        let body = Q::build_query(variables);
        let variables = serde_json::to_value(&body.variables)?;
        self.watch_query(body.query, Some(body.operation_name), variables, fetch_policy)
            .await
    }

    /// Number of queries currently watched.
    #[must_use]
    pub fn active_watch_count(&self) -> usize {
        lock(&self.inner.watches)
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Send a document and write its result to the cache.
    ///
    /// Identical requests (same document and variables) already on the wire
    /// are joined rather than sent again; only the first caller writes to
    /// the cache. Returns the data as read back from the cache, or the raw
    /// network data when the read is incomplete.
    pub(crate) async fn fetch_and_store(
        &self,
        doc: &Document,
        variables: &Value,
    ) -> Result<Value, ClientError> {
        let key = request_key(doc, variables);
        loop {
            let mut receiver = match self.claim_request(&key) {
                Claim::Lead(request) => return self.lead_request(request, doc, variables).await,
                Claim::Join(receiver) => receiver,
            };
            tracing::debug!(operation = doc.operation_name(), "joined in-flight request");
            let outcome = receiver
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|outcome| outcome.clone());
            match outcome {
                Some(Ok(data)) => {
                    return Ok(self.cache().read_query(doc, variables).unwrap_or(data));
                }
                Some(Err(error)) => return Err(ClientError::Shared(error)),
                // The first caller was dropped before finishing; try again.
                None => {}
            }
        }
    }

    fn claim_request(&self, key: &str) -> Claim {
        let mut in_flight = lock(&self.inner.in_flight);
        if let Some(receiver) = in_flight.get(key) {
            return Claim::Join(receiver.clone());
        }
        let (sender, receiver) = watch::channel(None);
        in_flight.insert(key.to_string(), receiver);
        Claim::Lead(InFlightRequest {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            sender,
        })
    }

    async fn lead_request(
        &self,
        request: InFlightRequest,
        doc: &Document,
        variables: &Value,
    ) -> Result<Value, ClientError> {
        let result = async {
            let data = self
                .inner
                .transport
                .execute(doc.transport_source(), doc.operation_name(), variables)
                .await?;
            self.cache().write_query(doc, variables, &data)?;
            Ok::<_, ClientError>(data)
        }
        .await;

        match result {
            Ok(data) => {
                request.finish(Ok(data.clone()));
                Ok(self.cache().read_query(doc, variables).unwrap_or(data))
            }
            Err(error) => {
                let error = Arc::new(error);
                request.finish(Err(Arc::clone(&error)));
                Err(Arc::try_unwrap(error).unwrap_or_else(ClientError::Shared))
            }
        }
    }

    pub(crate) fn forget_watch(&self, watch: &Arc<QueryWatch>) {
        lock(&self.inner.watches).remove(&watch_key(watch));
    }

    fn watches_named(&self, operation: &str) -> Vec<Arc<QueryWatch>> {
        lock(&self.inner.watches)
            .values()
            .filter_map(Weak::upgrade)
            .filter(|w| w.operation_name() == Some(operation))
            .collect()
    }
}

/// Deduplication key: the text sent plus the variables.
///
/// `serde_json` objects keep sorted keys, so equal variables render equally.
fn request_key(doc: &Document, variables: &Value) -> String {
    format!("{}\n{variables}", doc.transport_source())
}

enum Claim {
    Lead(InFlightRequest),
    Join(watch::Receiver<SharedOutcome>),
}

/// The first caller's claim on a request key.
///
/// Dropping it, whether finished or cancelled, frees the key. Callers that
/// joined see the outcome, or `None` when the first caller was cancelled.
struct InFlightRequest {
    inner: Arc<ClientInner>,
    key: String,
    sender: watch::Sender<SharedOutcome>,
}

impl InFlightRequest {
    fn finish(self, outcome: Result<Value, Arc<ClientError>>) {
        lock(&self.inner.in_flight).remove(&self.key);
        self.sender.send_replace(Some(outcome));
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.key);
    }
}

/// Registry key: the watch's address, stable while it is alive.
fn watch_key(watch: &Arc<QueryWatch>) -> usize {
    Arc::as_ptr(watch) as usize
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
