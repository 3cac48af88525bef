//! End-to-end scenarios for the tile cacher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use tilerelay::cacher::{CacherConfig, TileCacher, TileStore};
use tilerelay::completion;
use tilerelay::error::ErrorKind;
use tilerelay::tile::{CachedTile, TileKey};

/// Store that counts fetches, dawdles, then serves a fixed payload.
struct SlowStore {
    fetches: Arc<AtomicUsize>,
    delay: Duration,
    payload: Vec<u8>,
}

impl SlowStore {
    fn new(fetches: Arc<AtomicUsize>, payload: &[u8]) -> Self {
        Self {
            fetches,
            delay: Duration::from_millis(50),
            payload: payload.to_vec(),
        }
    }
}

impl TileStore for SlowStore {
    async fn fetch(&self, _key: &TileKey) -> Result<Option<Arc<CachedTile>>, ErrorKind> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Some(Arc::new(CachedTile::new(self.payload.clone()))))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coalescing_hundred_concurrent_gets_fetch_once() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let cacher = TileCacher::new(
        CacherConfig::default(),
        SlowStore::new(Arc::clone(&fetches), &[0xAB]),
    );
    let key = TileKey::new("k1");

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let cacher = cacher.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let (handle, result) = completion::channel();
                cacher.get(&key, handle);
                result.await
            })
        })
        .collect();

    for joined in join_all(tasks).await {
        let tile = joined.unwrap().unwrap().unwrap();
        assert_eq!(tile.data().as_ref(), &[0xAB]);
    }

    assert_eq!(fetches.load(Ordering::SeqCst), 1, "one backend fetch total");
    assert!(!cacher.is_fetching(&key), "waiter entry drained");
    assert!(cacher.cached(&key).is_some(), "hot tier populated");
    let stats = cacher.stats();
    assert_eq!(stats.fetches, 1);
    // A straggler that arrives after the fetch completes is a hot hit
    // instead of a coalesced join; either way nobody fetched twice.
    assert_eq!(stats.coalesced + stats.hot_hits, 99);
}

#[tokio::test]
async fn lock_until_set_defers_get_to_publication() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let cacher = TileCacher::new(
        CacherConfig::default(),
        SlowStore::new(Arc::clone(&fetches), &[1]),
    );
    let key = TileKey::new("k2");

    let lock = cacher.lock_until_set(vec![key.clone()]).unwrap();

    let (handle, result) = completion::channel();
    cacher.get(&key, handle);

    let (set_handle, set_result) = completion::channel();
    cacher.set(
        &key,
        Arc::new(CachedTile::new(vec![0x22])),
        Duration::from_secs(60),
        set_handle,
    );

    let tile = result.await.unwrap().unwrap();
    assert_eq!(tile.data().as_ref(), &[0x22]);
    set_result.await.unwrap();

    assert_eq!(fetches.load(Ordering::SeqCst), 0, "no backend fetch");
    assert!(!cacher.is_locked(&key), "barrier removed by publication");
    drop(lock);
    assert!(cacher.cached(&key).is_some(), "published key stays cached");
}

#[tokio::test]
async fn abandoned_lock_cancels_waiters_without_fetching() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let cacher = TileCacher::new(
        CacherConfig::default(),
        SlowStore::new(Arc::clone(&fetches), &[1]),
    );
    let key = TileKey::new("k3");

    let lock = cacher.lock_until_set(vec![key.clone()]).unwrap();

    let (handle, result) = completion::channel();
    cacher.get(&key, handle);

    drop(lock);

    assert_eq!(result.await, Err(ErrorKind::Cancelled));
    assert_eq!(fetches.load(Ordering::SeqCst), 0, "no backend fetch");
    assert!(!cacher.is_locked(&key));

    // The key is lockable again after the abandonment.
    assert!(cacher.lock_until_set(vec![key.clone()]).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_fetch_independently() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let cacher = TileCacher::new(
        CacherConfig::default(),
        SlowStore::new(Arc::clone(&fetches), &[9]),
    );

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let cacher = cacher.clone();
            tokio::spawn(async move {
                let key = TileKey::new(format!("tile-{i}"));
                let (handle, result) = completion::channel();
                cacher.get(&key, handle);
                result.await
            })
        })
        .collect();

    for joined in join_all(tasks).await {
        assert!(joined.unwrap().unwrap().is_some());
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn get_from_plain_thread_resolves() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let cacher = TileCacher::new(
        CacherConfig::default(),
        SlowStore::new(Arc::clone(&fetches), &[3]),
    );
    let key = TileKey::new("cross-thread");

    // The cacher is free-threaded: a caller outside the runtime can
    // register interest and block on the result.
    let worker = {
        let cacher = cacher.clone();
        let key = key.clone();
        std::thread::spawn(move || {
            let (handle, result) = completion::channel();
            cacher.get(&key, handle);
            result.wait_blocking()
        })
    };

    let outcome = tokio::task::spawn_blocking(move || worker.join().unwrap())
        .await
        .unwrap();
    let tile = outcome.unwrap().unwrap();
    assert_eq!(tile.data().as_ref(), &[3]);
}
