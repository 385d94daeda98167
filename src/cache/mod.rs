//! Generic single-flight cache with per-entry TTL.
//!
//! Guarantees at most one in-flight population per key: the first caller of
//! an unpopulated (or force-refreshed) key starts the population, and every
//! concurrent caller for that key awaits the same round and receives its
//! value or its error. Populations run on a detached task, so a waiter that
//! is cancelled does not cancel the round for the remaining waiters.
//!
//! The routing-metadata, schema and key-properties caches are independent
//! instances of this type; they share no coordination state, so unrelated
//! key spaces never serialize against each other.

use crate::context::OperationContext;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// One cached value. Replaced wholesale on refresh, never mutated in place,
/// so concurrent readers can never observe a torn entry.
struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: Option<Instant>,
    /// Monotonic install stamp, used to discard the result of a population
    /// round that was outpaced by a newer install.
    generation: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

type RoundResult<V> = Result<Arc<V>>;

/// Marker for a pending population round. Exists only between round start
/// and completion; removed atomically on completion (success or failure),
/// so a failed round never poisons the next call.
struct InFlight<V> {
    rx: watch::Receiver<Option<RoundResult<V>>>,
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    inflight: Option<InFlight<V>>,
    /// Stamp of the latest eviction. A population round started before the
    /// eviction must not reinstall its (pre-eviction) result.
    evicted_at: u64,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: None,
            inflight: None,
            evicted_at: 0,
        }
    }
}

struct Inner<K, V> {
    map: Mutex<HashMap<K, Slot<V>>>,
    /// Source of install stamps. Shared by `set` and population rounds so
    /// completion order is totally ordered per cache instance.
    stamp: AtomicU64,
    ttl: Option<Duration>,
}

impl<K, V> Inner<K, V> {
    fn next_generation(&self) -> u64 {
        self.stamp.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_generation(&self) -> u64 {
        self.stamp.load(Ordering::SeqCst)
    }
}

/// Keyed single-flight cache.
///
/// `ttl` applies to every entry installed in this instance; `None` means
/// entries never expire on their own and are replaced only by a forced
/// refresh, `set`, or `remove`.
pub struct SingleFlightCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for SingleFlightCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

enum Step<V> {
    /// Join an in-flight round.
    Wait(watch::Receiver<Option<RoundResult<V>>>),
    /// This caller starts a new round.
    Start {
        tx: watch::Sender<Option<RoundResult<V>>>,
        rx: watch::Receiver<Option<RoundResult<V>>>,
        started_at_generation: u64,
    },
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a cache whose entries expire `ttl` after install (`None` for
    /// no expiry).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                map: Mutex::new(HashMap::new()),
                stamp: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    /// Get the cached value for `key`, populating it if absent or expired.
    ///
    /// Concurrent callers for the same key coalesce onto one population
    /// round: `populate` is invoked at most once per round regardless of
    /// caller count, and every coalesced waiter receives the round's value
    /// or its error. `force_refresh` ignores any currently cached value but
    /// still coalesces with a round already in flight.
    ///
    /// A failed round is not cached; the next call starts over.
    pub async fn get_or_add<F, Fut>(
        &self,
        ctx: &OperationContext,
        key: &K,
        populate: F,
        force_refresh: bool,
    ) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        ctx.check()?;

        let step = {
            let mut map = self.inner.map.lock();
            let slot = map.entry(key.clone()).or_default();

            if !force_refresh {
                if let Some(entry) = &slot.entry {
                    if !entry.is_expired(Instant::now()) {
                        return Ok(entry.value.clone());
                    }
                }
            }

            match &slot.inflight {
                Some(inflight) => Step::Wait(inflight.rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    slot.inflight = Some(InFlight { rx: rx.clone() });
                    Step::Start {
                        tx,
                        rx,
                        started_at_generation: self.inner.current_generation(),
                    }
                }
            }
        };

        match step {
            Step::Wait(rx) => self.await_round(ctx, rx).await,
            Step::Start {
                tx,
                rx,
                started_at_generation,
            } => {
                let inner = self.inner.clone();
                let key = key.clone();
                let fut = populate();
                // Detached: the round completes for the remaining waiters
                // even if this caller is cancelled while waiting.
                tokio::spawn(async move {
                    let result = fut.await.map(Arc::new);
                    let mut map = inner.map.lock();
                    let slot = map.entry(key.clone()).or_default();
                    slot.inflight = None;
                    if let Ok(value) = &result {
                        let outpaced = slot
                            .entry
                            .as_ref()
                            .is_some_and(|e| e.generation > started_at_generation)
                            || slot.evicted_at > started_at_generation;
                        if outpaced {
                            debug!("discarding population result outpaced by newer install");
                        } else {
                            slot.entry = Some(CacheEntry {
                                value: value.clone(),
                                expires_at: inner.ttl.map(|ttl| Instant::now() + ttl),
                                generation: inner.next_generation(),
                            });
                        }
                    }
                    // No negative caching, and no leak of empty slots: the
                    // next call starts over from scratch.
                    if slot.entry.is_none() {
                        map.remove(&key);
                    }
                    let _ = tx.send(Some(result));
                });
                self.await_round(ctx, rx).await
            }
        }
    }

    /// Install a value directly, e.g. when a writer already holds fresh data
    /// after a successful update. Wins over any population round currently
    /// in flight.
    pub fn set(&self, key: K, value: V) {
        let mut map = self.inner.map.lock();
        let slot = map.entry(key).or_default();
        slot.entry = Some(CacheEntry {
            value: Arc::new(value),
            expires_at: self.inner.ttl.map(|ttl| Instant::now() + ttl),
            generation: self.inner.next_generation(),
        });
    }

    /// Evict `key` unconditionally. A round in flight is left to finish for
    /// its waiters, but its result is not reinstalled; a subsequent
    /// `get_or_add` repopulates.
    pub fn remove(&self, key: &K) {
        let mut map = self.inner.map.lock();
        if let Some(slot) = map.get_mut(key) {
            slot.entry = None;
            if slot.inflight.is_none() {
                map.remove(key);
            } else {
                slot.evicted_at = self.inner.next_generation();
            }
        }
    }

    /// Return the cached value without populating. Expired entries count as
    /// absent.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let map = self.inner.map.lock();
        map.get(key)
            .and_then(|slot| slot.entry.as_ref())
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Number of keys with a cached entry or an in-flight round.
    pub fn len(&self) -> usize {
        self.inner.map.lock().len()
    }

    /// Whether the cache holds no keys at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn await_round(
        &self,
        ctx: &OperationContext,
        mut rx: watch::Receiver<Option<RoundResult<V>>>,
    ) -> Result<Arc<V>> {
        tokio::select! {
            err = ctx.interrupted() => Err(err),
            changed = rx.wait_for(|round| round.is_some()) => match changed {
                Ok(round) => match (*round).clone() {
                    Some(result) => result,
                    None => Err(Error::Internal("population round yielded no result".into())),
                },
                Err(_) => Err(Error::Internal("population round was dropped".into())),
            },
        }
    }
}
