//! Request-coalescing tile cacher.
//!
//! The cacher fronts a bounded hot tier and coordinates concurrent demand
//! for the same key. When multiple callers ask for a cold key
//! simultaneously, only the first dispatches a backend fetch - every
//! other caller is parked as a waiter and receives the same result.
//! Producers that intend to publish a set of keys can raise a
//! lock-until-set barrier so readers wait for the publication instead of
//! fetching independently.
//!
//! ```text
//! Get A ─┐
//!        │     ┌────────────┐  miss   ┌───────────┐
//! Get B ─┼───► │ TileCacher │ ──────► │ TileStore │──► origin
//!        │     └─────┬──────┘         └─────┬─────┘
//! Get C ─┘           │ hot hit              │ on_tile_retrieved
//!                    ▼                      ▼
//!               immediate           [A, B, C all resolved]
//! ```
//!
//! Every public operation is callable from any thread; the three state
//! maps share one mutex and completion handles are always settled
//! outside it, so user callbacks can re-enter the cacher freely.

mod lock;
mod stats;
mod store;

pub use lock::CacherLock;
pub use stats::CacherStats;
pub use store::TileStore;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{BoundedTileCache, CacheStats};
use crate::cacher::stats::CacherCounters;
use crate::completion::CompletionHandle;
use crate::error::ErrorKind;
use crate::tile::{CachedTile, TileKey};

/// Default capacity of the hot tier, in entries.
pub const DEFAULT_HOT_CAPACITY: usize = 1024;

/// Configuration for a [`TileCacher`].
#[derive(Clone, Debug)]
pub struct CacherConfig {
    /// Capacity of the in-memory hot tier, in entries.
    pub hot_capacity: usize,
}

impl Default for CacherConfig {
    fn default() -> Self {
        Self {
            hot_capacity: DEFAULT_HOT_CAPACITY,
        }
    }
}

type Waiter = CompletionHandle<Option<Arc<CachedTile>>>;

/// State maps guarded by the cacher mutex.
///
/// A key appears in at most one of `get_waiters` and `set_waiters`; a
/// waiter list is non-empty for exactly as long as its entry exists
/// (`set_waiters` entries may be empty - the barrier exists before any
/// reader joins it).
struct CacherState {
    hot: BoundedTileCache,
    get_waiters: HashMap<TileKey, Vec<Waiter>>,
    set_waiters: HashMap<TileKey, Vec<Waiter>>,
}

/// Shared core: state maps plus counters.
///
/// Split out from [`TileCacher`] so lock guards and fetch tasks can hold
/// it without carrying the store type parameter.
pub(crate) struct CacherShared {
    state: Mutex<CacherState>,
    counters: CacherCounters,
}

impl std::fmt::Debug for CacherShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacherShared").finish_non_exhaustive()
    }
}

impl CacherShared {
    /// Publish a fetched tile and wake every waiter for the key.
    ///
    /// Ignores keys with no in-flight fetch (unsolicited callback).
    /// `None` resolves waiters with an absent tile; it is not an error.
    fn on_tile_retrieved(&self, key: &TileKey, tile: Option<Arc<CachedTile>>) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            let Some(waiters) = state.get_waiters.remove(key) else {
                return;
            };
            if let Some(tile) = &tile {
                state.hot.insert(key.clone(), Arc::clone(tile));
            }
            waiters
        };
        debug!(key = %key, waiters = waiters.len(), found = tile.is_some(), "tile retrieved");
        for waiter in waiters {
            waiter.resolve(tile.clone());
        }
    }

    /// Fail every waiter for a key whose fetch errored out.
    fn on_retrieve_error(&self, key: &TileKey) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            let Some(waiters) = state.get_waiters.remove(key) else {
                return;
            };
            waiters
        };
        warn!(key = %key, waiters = waiters.len(), "tile fetch failed");
        for waiter in waiters {
            waiter.fail(ErrorKind::Fetch);
        }
    }

    /// Release producer barriers, failing parked readers.
    ///
    /// Idempotent: keys without a barrier are skipped.
    fn unlock(&self, keys: &[TileKey]) {
        for key in keys {
            let waiters = {
                let mut state = self.state.lock().unwrap();
                let Some(waiters) = state.set_waiters.remove(key) else {
                    continue;
                };
                waiters
            };
            if !waiters.is_empty() {
                debug!(key = %key, waiters = waiters.len(), "lock released without publication");
            }
            for waiter in waiters {
                CacherCounters::bump(&self.counters.cancelled_waiters);
                waiter.fail(ErrorKind::Cancelled);
            }
        }
    }

    /// Reserved extension point, invoked after the lower-tier write.
    fn on_tile_set(&self, key: &TileKey) {
        debug!(key = %key, "lower tier write completed");
    }

    /// Reserved extension point, invoked after a failed lower-tier write.
    fn on_set_error(&self, key: &TileKey) {
        debug!(key = %key, "lower tier write failed");
    }
}

/// Coalescing cache over a backing [`TileStore`].
///
/// Cheap to clone; clones share the same state and store.
pub struct TileCacher<S> {
    shared: Arc<CacherShared>,
    store: Arc<S>,
    runtime: tokio::runtime::Handle,
}

impl<S> Clone for TileCacher<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            store: Arc::clone(&self.store),
            runtime: self.runtime.clone(),
        }
    }
}

impl<S> std::fmt::Debug for TileCacher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCacher").finish_non_exhaustive()
    }
}

impl<S: TileStore> TileCacher<S> {
    /// Create a cacher over `store`.
    ///
    /// Captures the current tokio runtime for store dispatch, so this
    /// must run inside a runtime context; the cacher itself is then
    /// callable from any thread. Use [`with_runtime`](Self::with_runtime)
    /// to construct from outside the runtime.
    pub fn new(config: CacherConfig, store: S) -> Self {
        Self::with_runtime(config, store, tokio::runtime::Handle::current())
    }

    /// Create a cacher dispatching store calls onto `runtime`.
    pub fn with_runtime(config: CacherConfig, store: S, runtime: tokio::runtime::Handle) -> Self {
        Self {
            shared: Arc::new(CacherShared {
                state: Mutex::new(CacherState {
                    hot: BoundedTileCache::new(config.hot_capacity),
                    get_waiters: HashMap::new(),
                    set_waiters: HashMap::new(),
                }),
                counters: CacherCounters::default(),
            }),
            store: Arc::new(store),
            runtime,
        }
    }

    /// Get a tile, coalescing with any in-flight work on the key.
    ///
    /// Resolution order:
    /// 1. hot-tier hit: the handle resolves immediately (a stale value is
    ///    acceptable - hot hits bypass producer locks);
    /// 2. a producer holds the key locked-until-set: the handle waits for
    ///    the publication;
    /// 3. a fetch is already in flight: the handle joins it;
    /// 4. cold key: the handle is registered and one backend fetch is
    ///    dispatched.
    ///
    /// Waiters for a key resolve in registration order.
    pub fn get(&self, key: &TileKey, handle: CompletionHandle<Option<Arc<CachedTile>>>) {
        enum Action {
            Resolve(Arc<CachedTile>, Waiter),
            Joined,
            Fetch,
        }

        let action = {
            let mut state = self.shared.state.lock().unwrap();
            if let Some(tile) = state.hot.get(key) {
                Action::Resolve(tile, handle)
            } else if let Some(waiters) = state.set_waiters.get_mut(key) {
                waiters.push(handle);
                Action::Joined
            } else if let Some(waiters) = state.get_waiters.get_mut(key) {
                waiters.push(handle);
                Action::Joined
            } else {
                state.get_waiters.insert(key.clone(), vec![handle]);
                Action::Fetch
            }
        };

        match action {
            Action::Resolve(tile, handle) => {
                CacherCounters::bump(&self.shared.counters.hot_hits);
                handle.resolve(Some(tile));
            }
            Action::Joined => {
                CacherCounters::bump(&self.shared.counters.coalesced);
            }
            Action::Fetch => {
                CacherCounters::bump(&self.shared.counters.fetches);
                self.dispatch_fetch(key.clone());
            }
        }
    }

    /// Publish a tile.
    ///
    /// Installs the value into the hot tier (even with no barrier on the
    /// key - unsolicited publications are allowed), resolves every reader
    /// parked on the key's barrier, then writes to the lower tier.
    /// `handle` settles with the outcome of the lower-tier write.
    pub fn set(
        &self,
        key: &TileKey,
        tile: Arc<CachedTile>,
        ttl: Duration,
        handle: CompletionHandle<()>,
    ) {
        let waiters = {
            let mut state = self.shared.state.lock().unwrap();
            state.hot.insert(key.clone(), Arc::clone(&tile));
            state.set_waiters.remove(key).unwrap_or_default()
        };
        debug!(key = %key, waiters = waiters.len(), "tile published");
        for waiter in waiters {
            waiter.resolve(Some(Arc::clone(&tile)));
        }

        let shared = Arc::clone(&self.shared);
        let store = Arc::clone(&self.store);
        let key = key.clone();
        self.runtime.spawn(async move {
            match store.store(&key, &tile, ttl).await {
                Ok(()) => {
                    shared.on_tile_set(&key);
                    handle.resolve(());
                }
                Err(kind) => {
                    shared.on_set_error(&key);
                    handle.fail(kind);
                }
            }
        });
    }

    /// Refresh a key's expiry in the lower tier.
    ///
    /// Pure pass-through: no core state changes, and touching an absent
    /// key is a no-op.
    pub fn touch(&self, key: &TileKey, ttl: Duration) {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        self.runtime.spawn(async move {
            if let Err(kind) = store.touch(&key, ttl).await {
                debug!(key = %key, error = %kind, "touch failed");
            }
        });
    }

    /// Declare that this caller will publish `keys`.
    ///
    /// Keys already locked, or with a fetch in flight, are skipped.
    /// Returns a guard owning the keys that were actually locked, or
    /// `None` when no key could be locked. Dropping the guard without
    /// publishing fails parked readers with
    /// [`ErrorKind::Cancelled`].
    pub fn lock_until_set(&self, keys: Vec<TileKey>) -> Option<CacherLock> {
        let mut locked = Vec::with_capacity(keys.len());
        {
            let mut state = self.shared.state.lock().unwrap();
            for key in keys {
                if state.set_waiters.contains_key(&key) || state.get_waiters.contains_key(&key) {
                    continue;
                }
                state.set_waiters.insert(key.clone(), Vec::new());
                locked.push(key);
            }
        }
        if locked.is_empty() {
            return None;
        }
        CacherCounters::bump(&self.shared.counters.locks);
        debug!(keys = locked.len(), "keys locked until set");
        Some(CacherLock::new(Arc::clone(&self.shared), locked))
    }

    /// Release barriers without publishing.
    ///
    /// Parked readers fail with [`ErrorKind::Cancelled`]. Idempotent;
    /// normally invoked through [`CacherLock`]'s drop.
    pub fn unlock(&self, keys: &[TileKey]) {
        self.shared.unlock(keys);
    }

    /// Callback from the fetcher seam: a fetch completed.
    ///
    /// Inserts the tile (when present) into the hot tier and resolves
    /// every waiter registered for the key, in FIFO order. `None` means
    /// the origin has no such tile; waiters see a successful absent
    /// resolution.
    pub fn on_tile_retrieved(&self, key: &TileKey, tile: Option<Arc<CachedTile>>) {
        self.shared.on_tile_retrieved(key, tile);
    }

    /// Callback from the fetcher seam: a fetch failed.
    ///
    /// Fails every waiter for the key with [`ErrorKind::Fetch`].
    pub fn on_retrieve_error(&self, key: &TileKey) {
        self.shared.on_retrieve_error(key);
    }

    /// Snapshot of the coalescing counters.
    pub fn stats(&self) -> CacherStats {
        self.shared.counters.snapshot()
    }

    /// Snapshot of the hot tier's counters.
    pub fn hot_stats(&self) -> CacheStats {
        self.shared.state.lock().unwrap().hot.stats()
    }

    /// Peek at the hot tier (promotes the entry like any read).
    pub fn cached(&self, key: &TileKey) -> Option<Arc<CachedTile>> {
        self.shared.state.lock().unwrap().hot.get(key)
    }

    /// Number of keys with an in-flight fetch.
    pub fn in_flight_gets(&self) -> usize {
        self.shared.state.lock().unwrap().get_waiters.len()
    }

    /// Returns true if a fetch is in flight for the key.
    pub fn is_fetching(&self, key: &TileKey) -> bool {
        self.shared.state.lock().unwrap().get_waiters.contains_key(key)
    }

    /// Returns true if a producer holds the key locked until set.
    pub fn is_locked(&self, key: &TileKey) -> bool {
        self.shared.state.lock().unwrap().set_waiters.contains_key(key)
    }

    /// Dispatch the backend fetch for a cold key.
    ///
    /// Runs outside the mutex; the fetch outcome re-enters through the
    /// retrieval callbacks.
    fn dispatch_fetch(&self, key: TileKey) {
        let shared = Arc::clone(&self.shared);
        let store = Arc::clone(&self.store);
        self.runtime.spawn(async move {
            match store.fetch(&key).await {
                Ok(tile) => shared.on_tile_retrieved(&key, tile),
                Err(kind) => {
                    warn!(key = %key, error = %kind, "backend fetch failed");
                    shared.on_retrieve_error(&key);
                }
            }
        });
    }
}
