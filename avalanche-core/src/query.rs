//! Per-key orchestration of fetch, validate and cache.

use futures::FutureExt;
use std::{any::type_name, fmt::Debug, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::{
    cache::{CacheEntry, CacheStore, EntryStatus, FetchOutcome, Lookup, Payload, SharedFetch, Ttl},
    endpoint::Endpoint,
    error::{AggregateError, QueryError, TransportError, ValidationError},
    fetch::Fetcher,
    key::CacheKey,
    model::NotFound,
    validate::Validated,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Observable state of one query.
///
/// `data` may be present alongside `Error` when a background revalidation of
/// previously good data failed. `fetching` is true while a fetch is pending,
/// including silent background revalidations.
#[derive(Debug)]
pub struct QueryResult<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    pub not_found: Option<NotFound>,
    pub ignored: bool,
    pub fetching: bool,
}

impl<T> Clone for QueryResult<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            not_found: self.not_found.clone(),
            ignored: self.ignored,
            fetching: self.fetching,
        }
    }
}

impl<T> QueryResult<T> {
    fn empty(status: QueryStatus) -> Self {
        Self { status, data: None, error: None, not_found: None, ignored: false, fetching: false }
    }

    pub fn idle() -> Self {
        Self::empty(QueryStatus::Idle)
    }

    pub fn loading() -> Self {
        Self { fetching: true, ..Self::empty(QueryStatus::Loading) }
    }

    pub fn success(data: T) -> Self {
        Self::shared(Arc::new(data))
    }

    fn shared(data: Arc<T>) -> Self {
        Self { data: Some(data), ..Self::empty(QueryStatus::Success) }
    }

    pub fn not_found(what: NotFound) -> Self {
        Self { not_found: Some(what), ..Self::empty(QueryStatus::Success) }
    }

    pub fn failed(error: QueryError) -> Self {
        Self { error: Some(error), ..Self::empty(QueryStatus::Error) }
    }

    /// Placeholder for a query that does not apply to the current parameters.
    pub fn ignored() -> Self {
        Self { ignored: true, ..Self::empty(QueryStatus::Success) }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_not_found(&self) -> bool {
        self.is_success() && self.not_found.is_some()
    }
}

/// Receives every terminal query failure and every failed aggregate.
pub trait ErrorReporter: Send + Sync + Debug {
    fn report_query_error(&self, key: &CacheKey, error: &QueryError);

    fn report_aggregate_error(&self, error: &AggregateError);
}

/// Default reporter: failures go to the `tracing` error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_query_error(&self, key: &CacheKey, error: &QueryError) {
        let kind = if error.is_validation() { "validation" } else { "transport" };
        error!(%key, kind, %error, "query failed");
    }

    fn report_aggregate_error(&self, error: &AggregateError) {
        error!(failed = error.errors().len(), "{error}");
        for err in error.errors() {
            error!(error = %err, "aggregated query failed");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub enabled: bool,
    pub ttl: Ttl,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enabled: true, ttl: Ttl::default() }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.ttl = Ttl::new(stale_time, self.ttl.cache_time());
        self
    }

    #[must_use]
    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.ttl = Ttl::new(self.ttl.stale_time(), cache_time);
        self
    }
}

/// Session context every query runs against: the shared cache, the fetcher
/// and the error reporter.
#[derive(Debug, Clone)]
pub struct QueryClient {
    cache: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    reporter: Arc<dyn ErrorReporter>,
    defaults: QueryOptions,
}

impl QueryClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { cache: CacheStore::new(), fetcher, reporter, defaults: QueryOptions::default() }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: QueryOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn reporter(&self) -> Arc<dyn ErrorReporter> {
        Arc::clone(&self.reporter)
    }

    pub fn query<E: Endpoint>(&self, endpoint: E) -> Query<E> {
        Query { client: self.clone(), endpoint: Arc::new(endpoint), options: self.defaults }
    }

    /// Warm the cache for `endpoint` under the default options.
    pub async fn prefetch<E: Endpoint>(&self, endpoint: E) {
        self.query(endpoint).prefetch().await;
    }

    /// End of session: drop every cached entry.
    pub fn shutdown(&self) {
        debug!(entries = self.cache.len(), "shutting down query client");
        self.cache.clear();
    }
}

pub struct Query<E: Endpoint> {
    client: QueryClient,
    endpoint: Arc<E>,
    options: QueryOptions,
}

impl<E: Endpoint> Query<E> {
    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn key(&self) -> CacheKey {
        self.endpoint.key()
    }

    fn gate(&self) -> Option<QueryResult<E::Output>> {
        if !self.options.enabled || !self.endpoint.enabled() {
            trace!(what = self.endpoint.what(), "query disabled");
            return Some(QueryResult::idle());
        }
        if !self.endpoint.applies() {
            debug!(what = self.endpoint.what(), "query does not apply, ignoring");
            return Some(QueryResult::ignored());
        }
        None
    }

    /// Resolve the query: cached data when fresh, stale data plus a background
    /// revalidation when stale, otherwise wait for a fetch.
    pub async fn fetch(&self) -> QueryResult<E::Output> {
        if let Some(result) = self.gate() {
            return result;
        }

        let key = self.key();
        debug!(%key, "initiating query");
        match self.client.cache.lookup(&key) {
            Lookup::Fresh(entry) => {
                trace!(%key, "cache hit");
                project(&entry, false)
            }
            Lookup::Stale(entry) => {
                debug!(%key, "serving stale data, revalidating");
                drop(self.start(&key));
                project(&entry, true)
            }
            Lookup::Miss => {
                debug!(%key, "cache miss");
                settle(self.start(&key).await)
            }
        }
    }

    /// Non-blocking variant of [`fetch`](Self::fetch): schedules whatever
    /// fetch is needed and returns the state as of now, `Loading` on a miss.
    pub fn trigger(&self) -> QueryResult<E::Output> {
        if let Some(result) = self.gate() {
            return result;
        }

        let key = self.key();
        match self.client.cache.lookup(&key) {
            Lookup::Fresh(entry) => project(&entry, false),
            Lookup::Stale(entry) => {
                drop(self.start(&key));
                project(&entry, true)
            }
            Lookup::Miss => {
                drop(self.start(&key));
                self.snapshot()
            }
        }
    }

    /// Current state without fetching.
    pub fn snapshot(&self) -> QueryResult<E::Output> {
        if let Some(result) = self.gate() {
            return result;
        }

        match self.client.cache.peek(&self.key()) {
            Some((entry, fetching)) => project(&entry, fetching),
            None => QueryResult::idle(),
        }
    }

    /// Populate the cache under the same key and freshness rules as
    /// [`fetch`](Self::fetch), sharing any fetch already in flight.
    pub async fn prefetch(&self) {
        if self.gate().is_some() {
            return;
        }

        let key = self.key();
        let started = Instant::now();
        trace!(%key, "prefetching");
        match self.client.cache.lookup(&key) {
            Lookup::Fresh(_) => {}
            Lookup::Stale(_) | Lookup::Miss => {
                let _ = self.start(&key).await;
            }
        }
        trace!(%key, elapsed_ms = started.elapsed().as_millis() as u64, "finished prefetching");
    }

    pub fn invalidate(&self) -> bool {
        self.client.cache.invalidate(&self.key())
    }

    fn start(&self, key: &CacheKey) -> SharedFetch {
        let endpoint = Arc::clone(&self.endpoint);
        let fetcher = Arc::clone(&self.client.fetcher);
        let reporter = Arc::clone(&self.client.reporter);
        let task_key = key.clone();

        self.client.cache.begin(key, self.options.ttl, move || {
            run_fetch(endpoint, fetcher, reporter, task_key).boxed()
        })
    }
}

/// Issue the request, await it, validate the payload. Failures are reported
/// once here, however many callers share the fetch.
async fn run_fetch<E: Endpoint>(
    endpoint: Arc<E>,
    fetcher: Arc<dyn Fetcher>,
    reporter: Arc<dyn ErrorReporter>,
    key: CacheKey,
) -> FetchOutcome {
    let request = endpoint.request();
    let started = Instant::now();
    debug!(%key, url = %request.url, what = endpoint.what(), "fetching");

    let raw = match fetcher.fetch(&request).await {
        Ok(raw) => raw,
        Err(TransportError::NotFound { url }) => {
            debug!(%key, url, "resource not found");
            return Ok(Payload::NotFound(NotFound::new(endpoint.what())));
        }
        Err(err) => {
            warn!(%key, error = %err, "fetch failed");
            let err = QueryError::from(err);
            reporter.report_query_error(&key, &err);
            return Err(err);
        }
    };

    match endpoint.validate(&raw) {
        Validated::Valid(value) => {
            trace!(%key, elapsed_ms = started.elapsed().as_millis() as u64, "fetched");
            Ok(Payload::Data(Arc::new(value)))
        }
        Validated::Invalid(err) => {
            warn!(%key, url = %request.url, error = %err, "failed to parse");
            let err = QueryError::from(err);
            reporter.report_query_error(&key, &err);
            Err(err)
        }
    }
}

fn settle<T: Send + Sync + 'static>(outcome: FetchOutcome) -> QueryResult<T> {
    match outcome {
        Ok(payload) => from_payload(&payload),
        Err(err) => QueryResult::failed(err),
    }
}

fn project<T: Send + Sync + 'static>(entry: &CacheEntry, fetching: bool) -> QueryResult<T> {
    let mut result = match (entry.status(), &entry.value) {
        (_, None) if fetching => QueryResult::loading(),
        (EntryStatus::Success, Some(payload)) => from_payload(payload),
        (EntryStatus::Error, value) => match entry.error() {
            Some(err) => QueryResult {
                data: value.as_ref().and_then(|v| downcast(v).ok()),
                ..QueryResult::failed(err.clone())
            },
            None => QueryResult::loading(),
        },
        _ => QueryResult::loading(),
    };
    result.fetching = fetching;
    result
}

fn from_payload<T: Send + Sync + 'static>(payload: &Payload) -> QueryResult<T> {
    match payload {
        Payload::NotFound(what) => QueryResult::not_found(what.clone()),
        Payload::Data(_) => match downcast(payload) {
            Ok(data) => QueryResult::shared(data),
            Err(err) => QueryResult::failed(err),
        },
    }
}

fn downcast<T: Send + Sync + 'static>(payload: &Payload) -> Result<Arc<T>, QueryError> {
    let mismatch = |actual: &str| {
        QueryError::from(ValidationError {
            path: "$".to_string(),
            expected: type_name::<T>().to_string(),
            actual: actual.to_string(),
        })
    };

    match payload {
        Payload::Data(any) => Arc::clone(any)
            .downcast::<T>()
            .map_err(|_| mismatch("a value cached under the same key by another type")),
        Payload::NotFound(_) => Err(mismatch("not found")),
    }
}
