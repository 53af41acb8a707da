//! Shared in-memory cache with staleness, eviction and in-flight de-duplication.
//!
//! Every key owns one slot. A slot holds the last settled entry and at most one
//! in-flight fetch; callers arriving while a fetch is pending attach to it
//! instead of starting another. Fetches are spawned onto the runtime, so a
//! result still lands in the store after its callers have stopped waiting.

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{runtime::Handle, time::Instant};
use tracing::{debug, trace};

use crate::{error::QueryError, key::CacheKey, model::NotFound};

/// A validated value, type-erased so one store can hold every endpoint.
#[derive(Clone)]
pub(crate) enum Payload {
    Data(Arc<dyn Any + Send + Sync>),
    NotFound(NotFound),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Data(_) => f.write_str("Data(..)"),
            Payload::NotFound(nf) => f.debug_tuple("NotFound").field(nf).finish(),
        }
    }
}

pub(crate) type FetchOutcome = Result<Payload, QueryError>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Freshness windows for one query. `cache_time` is never shorter than `stale_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl {
    stale_time: Duration,
    cache_time: Duration,
}

impl Ttl {
    pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self { stale_time, cache_time: cache_time.max(stale_time) }
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn cache_time(&self) -> Duration {
        self.cache_time
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STALE_TIME, Self::DEFAULT_CACHE_TIME)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Loading,
    Success,
    Error,
}

/// Last settled state for one key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    pub(crate) value: Option<Payload>,
    error: Option<QueryError>,
    fetched_at: Option<Instant>,
    stale_at: Instant,
    expires_at: Instant,
    status: EntryStatus,
}

impl CacheEntry {
    fn pending(key: CacheKey, ttl: Ttl, now: Instant) -> Self {
        Self {
            key,
            value: None,
            error: None,
            fetched_at: None,
            stale_at: now,
            expires_at: now + ttl.cache_time,
            status: EntryStatus::Loading,
        }
    }

    fn forget_value(&mut self) {
        self.value = None;
        self.error = None;
        self.fetched_at = None;
        self.status = EntryStatus::Loading;
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    pub fn stale_at(&self) -> Instant {
        self.stale_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

struct Slot {
    entry: CacheEntry,
    cache_time: Duration,
    in_flight: Option<(u64, SharedFetch)>,
}

/// Result of a cache read that may lead to a fetch.
#[derive(Debug)]
pub(crate) enum Lookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Miss,
}

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    next_fetch: AtomicU64,
}

/// The cache context for one session. Cloning is cheap and shares the store.
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `key`, evicting it first if it went unaccessed past its expiry.
    pub(crate) fn lookup(&self, key: &CacheKey) -> Lookup {
        let now = Instant::now();
        let mut slots = self.inner.slots.lock();

        let expired = match slots.get(key) {
            None => return Lookup::Miss,
            Some(slot) => now >= slot.entry.expires_at,
        };

        if expired {
            let fetching = slots.get(key).is_some_and(|slot| slot.in_flight.is_some());
            if fetching {
                if let Some(slot) = slots.get_mut(key) {
                    slot.entry.forget_value();
                }
            } else {
                slots.remove(key);
            }
            debug!(%key, "evicted expired entry");
            return Lookup::Miss;
        }

        let Some(slot) = slots.get_mut(key) else {
            return Lookup::Miss;
        };
        slot.entry.expires_at = slot.entry.expires_at.max(now + slot.cache_time);

        match slot.entry.value {
            Some(_) if now < slot.entry.stale_at => Lookup::Fresh(slot.entry.clone()),
            Some(_) => Lookup::Stale(slot.entry.clone()),
            None => Lookup::Miss,
        }
    }

    /// Join the in-flight fetch for `key`, or start one with `start`.
    ///
    /// `start` only runs when nothing is pending for the key. The returned
    /// handle resolves after the outcome has been committed.
    pub(crate) fn begin<F>(&self, key: &CacheKey, ttl: Ttl, start: F) -> SharedFetch
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutcome>,
    {
        let now = Instant::now();
        let mut slots = self.inner.slots.lock();
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
            entry: CacheEntry::pending(key.clone(), ttl, now),
            cache_time: ttl.cache_time,
            in_flight: None,
        });

        if let Some((_, fetch)) = &slot.in_flight {
            debug!(%key, "joining in-flight fetch");
            return fetch.clone();
        }

        let id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
        let store = self.clone();
        let commit_key = key.clone();
        let work = start();
        let fetch = async move {
            let outcome = work.await;
            store.commit(&commit_key, id, ttl, &outcome);
            outcome
        }
        .boxed()
        .shared();

        slot.in_flight = Some((id, fetch.clone()));
        drop(slots);

        trace!(%key, fetch_id = id, "started fetch");
        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(fetch.clone());
        }

        fetch
    }

    fn commit(&self, key: &CacheKey, id: u64, ttl: Ttl, outcome: &FetchOutcome) {
        let now = Instant::now();
        let mut slots = self.inner.slots.lock();

        let Some(slot) = slots.get_mut(key) else {
            debug!(%key, "dropping result for a key that was cleared");
            return;
        };
        if !matches!(slot.in_flight, Some((current, _)) if current == id) {
            debug!(%key, "dropping superseded result");
            return;
        }

        slot.in_flight = None;
        slot.cache_time = ttl.cache_time;

        let entry = &mut slot.entry;
        match outcome {
            Ok(payload) => {
                entry.value = Some(payload.clone());
                entry.error = None;
                entry.status = EntryStatus::Success;
                entry.fetched_at = Some(now);
                entry.stale_at = now + ttl.stale_time;
                entry.expires_at = now + ttl.cache_time;
            }
            Err(err) => {
                // Keep any previous value, but make it eligible for refetch.
                entry.error = Some(err.clone());
                entry.status = EntryStatus::Error;
                entry.stale_at = entry.stale_at.min(now);
                entry.expires_at = entry.expires_at.max(now + ttl.cache_time);
            }
        }
        trace!(%key, status = ?entry.status, "committed fetch result");
    }

    /// Current state of `key` without side effects, plus whether a fetch is pending.
    pub(crate) fn peek(&self, key: &CacheKey) -> Option<(CacheEntry, bool)> {
        let now = Instant::now();
        let slots = self.inner.slots.lock();
        let slot = slots.get(key)?;
        let fetching = slot.in_flight.is_some();

        if now < slot.entry.expires_at {
            Some((slot.entry.clone(), fetching))
        } else if fetching {
            let mut entry = slot.entry.clone();
            entry.forget_value();
            Some((entry, true))
        } else {
            None
        }
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.peek(key).map(|(entry, _)| entry)
    }

    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inner.slots.lock().get(key).is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Drop `key`. A fetch still running for it will not commit.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.inner.slots.lock().remove(key).is_some();
        if removed {
            debug!(%key, "invalidated entry");
        }
        removed
    }

    /// Evict every idle entry past its expiry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.inner.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.in_flight.is_some() || now < slot.entry.expires_at);
        let purged = before - slots.len();
        if purged > 0 {
            debug!(purged, "purged expired entries");
        }
        purged
    }

    /// Teardown: forget every entry and every pending fetch.
    pub fn clear(&self) {
        self.inner.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore").field("entry_count", &self.len()).finish()
    }
}
