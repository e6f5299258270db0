//! Synchronization cache — the single read-through cache over the four
//! entity families the UI reads.
//!
//! ## Contract
//!
//! - `read` serves a `Fresh` entry immediately; anything else triggers
//!   exactly one remote fetch per key, no matter how many readers arrive
//!   while it is in flight (single-flight coalescing).
//! - `invalidate` only marks entries; the next `read` fetches.
//! - `write` installs a mutation response directly as `Fresh`, skipping
//!   a round trip.
//! - A fetch, once started, runs to completion even if every reader has
//!   gone away; its result still lands in the cache.
//!
//! Per-mutation invalidation lives in [`SyncCache::apply_mutation`] —
//! one table instead of invalidation calls scattered across call sites.
//!
//! ## Staleness
//!
//! | Family         | `stale_after`                                  |
//! |----------------|------------------------------------------------|
//! | currentUser    | 5 minutes                                      |
//! | taskDetail(id) | 5 minutes                                      |
//! | stats          | 1 minute                                       |
//! | taskCollection | never; invalidated only by mutations          |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::events::{EngineEvent, EventSender, publish};
use crate::models::{StatsSnapshot, Task, User};
use crate::transport::RemoteFailure;

const USER_TTL: Duration = Duration::from_secs(5 * 60);
const TASK_DETAIL_TTL: Duration = Duration::from_secs(5 * 60);
const STATS_TTL: Duration = Duration::from_secs(60);

/// `(entityFamily, entityKey)` pairs. Three families are singletons; task
/// detail is keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    CurrentUser,
    TaskDetail(i64),
    TaskCollection,
    Stats,
}

impl CacheKey {
    fn stale_after(&self) -> Option<Duration> {
        match self {
            Self::CurrentUser => Some(USER_TTL),
            Self::TaskDetail(_) => Some(TASK_DETAIL_TTL),
            Self::Stats => Some(STATS_TTL),
            Self::TaskCollection => None,
        }
    }

    /// Collection-family entries are removed on invalidation instead of
    /// being marked stale.
    fn is_collection(&self) -> bool {
        matches!(self, Self::TaskCollection)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentUser => write!(f, "current_user"),
            Self::TaskDetail(id) => write!(f, "task_detail({id})"),
            Self::TaskCollection => write!(f, "task_collection"),
            Self::Stats => write!(f, "stats"),
        }
    }
}

/// Cached payload. Which variant lives under which key is fixed by the
/// fetcher contract: `CurrentUser → User`, `TaskDetail → Task`,
/// `TaskCollection → Tasks`, `Stats → Stats`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    User(User),
    Task(Task),
    Tasks(Vec<Task>),
    Stats(StatsSnapshot),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Task(_) => "task",
            Self::Tasks(_) => "tasks",
            Self::Stats(_) => "stats",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Empty,
    Loading,
    Fresh,
    Stale,
    Errored,
}

struct Entry {
    state: EntryState,
    value: Option<CacheValue>,
    error: Option<RemoteFailure>,
    fetched_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, key: &CacheKey) -> bool {
        match (self.fetched_at, key.stale_after()) {
            (Some(at), Some(ttl)) => at.elapsed() >= ttl,
            _ => false,
        }
    }
}

/// Performs the actual remote fetch for one key. Implemented by the API
/// client in production and by scripted fetchers in tests.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<CacheValue, RemoteFailure>;
}

type FetchOutcome = Result<CacheValue, RemoteFailure>;

/// Mutation outcomes reported by the workflow engine and session
/// authority. Each variant's cache effects are listed in one place,
/// [`SyncCache::apply_mutation`].
#[derive(Debug, Clone)]
pub enum Mutation {
    TaskCreated(Task),
    TaskTransitioned(Task),
    BranchAssigned(Task),
    TaskUpdated { task: Task, stats_affected: bool },
    SessionEstablished,
    SessionCleared,
}

struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    in_flight: HashMap<CacheKey, broadcast::Sender<FetchOutcome>>,
}

struct CacheInner {
    fetcher: Arc<dyn EntityFetcher>,
    events: EventSender,
    state: Mutex<CacheState>,
}

impl CacheInner {
    // All mutations under this lock are plain value swaps, so data behind
    // a poisoned lock is still consistent.
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_fetch(&self, key: &CacheKey, outcome: FetchOutcome) {
        let state = {
            let mut guard = self.state();
            let (entry, state) = match &outcome {
                Ok(value) => (
                    Entry {
                        state: EntryState::Fresh,
                        value: Some(value.clone()),
                        error: None,
                        fetched_at: Some(Instant::now()),
                    },
                    EntryState::Fresh,
                ),
                Err(failure) => (
                    Entry {
                        state: EntryState::Errored,
                        value: None,
                        error: Some(failure.clone()),
                        fetched_at: None,
                    },
                    EntryState::Errored,
                ),
            };
            guard.entries.insert(key.clone(), entry);
            // Waiters subscribed under this same lock, so sending before
            // releasing it cannot lose a wakeup.
            if let Some(tx) = guard.in_flight.remove(key) {
                let _ = tx.send(outcome);
            }
            state
        };
        debug!(key = %key, ?state, "fetch settled");
        publish(
            &self.events,
            EngineEvent::CacheChanged {
                key: key.clone(),
                state,
            },
        );
    }
}

enum ReadPlan {
    Hit(CacheValue),
    Await(broadcast::Receiver<FetchOutcome>),
    Fetch(broadcast::Receiver<FetchOutcome>),
}

pub struct SyncCache {
    inner: Arc<CacheInner>,
}

impl SyncCache {
    pub fn new(fetcher: Arc<dyn EntityFetcher>, events: EventSender) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                events,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
            }),
        }
    }

    /// Read-through. Serves `Fresh`-within-TTL immediately; otherwise
    /// joins or starts the single in-flight fetch for this key.
    pub async fn read(&self, key: CacheKey) -> Result<CacheValue, RemoteFailure> {
        let mut rx = match self.begin_read(&key) {
            ReadPlan::Hit(value) => return Ok(value),
            ReadPlan::Await(rx) => rx,
            ReadPlan::Fetch(rx) => {
                self.spawn_fetch(key.clone());
                rx
            }
        };
        match rx.recv().await {
            Ok(outcome) => outcome,
            // The fetch task cannot vanish without sending unless the
            // runtime is shutting down underneath us.
            Err(_) => Err(RemoteFailure::transport("cache fetch was abandoned")),
        }
    }

    fn begin_read(&self, key: &CacheKey) -> ReadPlan {
        let mut guard = self.inner.state();

        if let Some(entry) = guard.entries.get_mut(key) {
            if entry.state == EntryState::Fresh {
                if entry.expired(key) {
                    entry.state = EntryState::Stale;
                } else if let Some(value) = &entry.value {
                    return ReadPlan::Hit(value.clone());
                }
            }
        }

        if let Some(tx) = guard.in_flight.get(key) {
            return ReadPlan::Await(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(1);
        guard.in_flight.insert(key.clone(), tx);
        let previous_value = guard.entries.remove(key).and_then(|e| e.value);
        guard.entries.insert(
            key.clone(),
            Entry {
                state: EntryState::Loading,
                value: previous_value,
                error: None,
                fetched_at: None,
            },
        );
        ReadPlan::Fetch(rx)
    }

    /// The fetch runs detached so a caller navigating away (dropping its
    /// future) does not cancel it; the result still lands in the cache.
    fn spawn_fetch(&self, key: CacheKey) {
        let inner = self.inner.clone();
        debug!(key = %key, "fetch started");
        tokio::spawn(async move {
            let outcome = inner.fetcher.fetch(&key).await;
            inner.finish_fetch(&key, outcome);
        });
    }

    /// Mark an entry stale (collection families are removed instead).
    /// Never fetches. An entry whose fetch is in flight is left alone;
    /// the settling fetch overwrites it anyway.
    pub fn invalidate(&self, key: &CacheKey) {
        let published_state = {
            let mut guard = self.inner.state();
            match guard.entries.get(key).map(|e| e.state) {
                None | Some(EntryState::Loading) => None,
                Some(_) if key.is_collection() => {
                    guard.entries.remove(key);
                    Some(EntryState::Empty)
                }
                Some(_) => {
                    if let Some(entry) = guard.entries.get_mut(key) {
                        entry.state = EntryState::Stale;
                    }
                    Some(EntryState::Stale)
                }
            }
        };
        if let Some(state) = published_state {
            debug!(key = %key, ?state, "invalidated");
            publish(
                &self.inner.events,
                EngineEvent::CacheChanged {
                    key: key.clone(),
                    state,
                },
            );
        }
    }

    /// Install a mutation response directly as `Fresh`.
    pub fn write(&self, key: CacheKey, value: CacheValue) {
        {
            let mut guard = self.inner.state();
            guard.entries.insert(
                key.clone(),
                Entry {
                    state: EntryState::Fresh,
                    value: Some(value),
                    error: None,
                    fetched_at: Some(Instant::now()),
                },
            );
        }
        publish(
            &self.inner.events,
            EngineEvent::CacheChanged {
                key,
                state: EntryState::Fresh,
            },
        );
    }

    /// Current state of an entry. `Fresh` entries past their TTL report
    /// `Stale`; callers must branch on this rather than assume a value.
    pub fn entry_state(&self, key: &CacheKey) -> EntryState {
        let guard = self.inner.state();
        match guard.entries.get(key) {
            None => EntryState::Empty,
            Some(entry) if entry.state == EntryState::Fresh && entry.expired(key) => {
                EntryState::Stale
            }
            Some(entry) => entry.state,
        }
    }

    /// The recorded failure for an `Errored` entry, if any.
    pub fn entry_error(&self, key: &CacheKey) -> Option<RemoteFailure> {
        let guard = self.inner.state();
        guard.entries.get(key).and_then(|e| e.error.clone())
    }

    /// The per-operation invalidation graph, in one place. Mutation
    /// responses that carry the updated task are written through
    /// directly; derived families they affect are marked stale.
    pub fn apply_mutation(&self, mutation: Mutation) {
        match mutation {
            Mutation::TaskCreated(_) => {
                self.invalidate(&CacheKey::TaskCollection);
                self.invalidate(&CacheKey::Stats);
            }
            Mutation::TaskTransitioned(task) => {
                let id = task.id;
                self.write(CacheKey::TaskDetail(id), CacheValue::Task(task));
                self.invalidate(&CacheKey::Stats);
            }
            Mutation::BranchAssigned(task) => {
                let id = task.id;
                self.write(CacheKey::TaskDetail(id), CacheValue::Task(task));
            }
            Mutation::TaskUpdated {
                task,
                stats_affected,
            } => {
                let id = task.id;
                self.write(CacheKey::TaskDetail(id), CacheValue::Task(task));
                self.invalidate(&CacheKey::TaskCollection);
                if stats_affected {
                    self.invalidate(&CacheKey::Stats);
                }
            }
            Mutation::SessionEstablished | Mutation::SessionCleared => {
                self.invalidate(&CacheKey::CurrentUser);
            }
        }
    }

    // ── Typed reads ───────────────────────────────────────────────────

    pub async fn current_user(&self) -> Result<User, RemoteFailure> {
        match self.read(CacheKey::CurrentUser).await? {
            CacheValue::User(user) => Ok(user),
            other => Err(shape_mismatch(&CacheKey::CurrentUser, &other)),
        }
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, RemoteFailure> {
        match self.read(CacheKey::TaskCollection).await? {
            CacheValue::Tasks(tasks) => Ok(tasks),
            other => Err(shape_mismatch(&CacheKey::TaskCollection, &other)),
        }
    }

    pub async fn task(&self, id: i64) -> Result<Task, RemoteFailure> {
        match self.read(CacheKey::TaskDetail(id)).await? {
            CacheValue::Task(task) => Ok(task),
            other => Err(shape_mismatch(&CacheKey::TaskDetail(id), &other)),
        }
    }

    pub async fn stats(&self) -> Result<StatsSnapshot, RemoteFailure> {
        match self.read(CacheKey::Stats).await? {
            CacheValue::Stats(stats) => Ok(stats),
            other => Err(shape_mismatch(&CacheKey::Stats, &other)),
        }
    }
}

fn shape_mismatch(key: &CacheKey, value: &CacheValue) -> RemoteFailure {
    RemoteFailure::transport(format!(
        "fetcher returned a {} payload for {key}",
        value.kind()
    ))
}
