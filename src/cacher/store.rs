//! Backing-store seam for the tile cacher.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::tile::{CachedTile, TileKey};

/// Lower-tier store behind the cacher.
///
/// Concrete backends (HTTP origin, database loader, remote memcache)
/// implement this seam; the cacher calls it on cold misses and on
/// publications and funnels the outcome back to waiters.
///
/// `store` and `touch` default to no-ops for read-only backends such as
/// an HTTP origin. A `touch` on a key the backend does not know is a
/// no-op, not an error.
pub trait TileStore: Send + Sync + 'static {
    /// Fetch a tile from the backing store.
    ///
    /// `Ok(None)` means the origin answered and has no tile for this key;
    /// waiters observe that as a successful resolution of an absent tile.
    /// `Err` means the fetch itself failed.
    fn fetch(
        &self,
        key: &TileKey,
    ) -> impl Future<Output = Result<Option<Arc<CachedTile>>, ErrorKind>> + Send;

    /// Write a published tile to the lower tier.
    fn store(
        &self,
        key: &TileKey,
        tile: &Arc<CachedTile>,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), ErrorKind>> + Send {
        let _ = (key, tile, ttl);
        std::future::ready(Ok(()))
    }

    /// Refresh a key's expiry in the lower tier.
    fn touch(
        &self,
        key: &TileKey,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), ErrorKind>> + Send {
        let _ = (key, ttl);
        std::future::ready(Ok(()))
    }
}
