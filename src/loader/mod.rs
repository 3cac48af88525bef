//! Tile loaders.
//!
//! A [`TileLoader`] fetches tiles by grid coordinates and imagery
//! version; [`HttpTileLoader`] does so over the pooled
//! [`HttpClient`](crate::http::HttpClient). [`LoaderStore`] adapts any
//! loader into the cacher's [`TileStore`](crate::cacher::TileStore)
//! seam, so a cold miss in the cacher flows through the loader and back
//! into the retrieval callbacks.

mod http;

pub use self::http::{HttpTileLoader, HttpTileLoaderConfig};

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::cacher::TileStore;
use crate::completion::{self, CompletionHandle};
use crate::error::ErrorKind;
use crate::tile::{CachedTile, TileId, TileKey};

/// Abstract tile fetcher.
///
/// `load` is fire-and-forget: the implementation settles the handle with
/// the tile (`None` when the backend answered and has no such tile) or
/// fails it, typically with
/// [`ErrorKind::Fetch`](crate::error::ErrorKind::Fetch).
/// Implementations must tolerate being invoked before their transport is
/// ready - buffer the request or fail fast with `Fetch`.
pub trait TileLoader: Send + Sync + 'static {
    /// Fetch the tile for `tile` under imagery `version`.
    fn load(
        &self,
        handle: CompletionHandle<Option<Arc<CachedTile>>>,
        tile: &TileId,
        version: &str,
    );

    /// Advisory routing filter: does this loader serve `version`?
    fn has_version(&self, version: &str) -> bool;
}

/// Adapts a [`TileLoader`] into the cacher's backing-store seam.
///
/// Keys must be in the canonical `"{version}/{zoom}/{col}/{row}"` form;
/// anything else fails the fetch. `store` and `touch` keep their no-op
/// defaults - loader-backed origins are read-only.
#[derive(Debug)]
pub struct LoaderStore<L> {
    loader: L,
}

impl<L> LoaderStore<L> {
    /// Wrap a loader.
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// The wrapped loader.
    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: TileLoader> TileStore for LoaderStore<L> {
    fn fetch(
        &self,
        key: &TileKey,
    ) -> impl Future<Output = Result<Option<Arc<CachedTile>>, ErrorKind>> + Send {
        let (handle, result) = completion::channel();
        match key.parse_tile() {
            Some((version, tile)) => self.loader.load(handle, &tile, version),
            None => {
                warn!(key = %key, "key is not in canonical tile form");
                handle.fail(ErrorKind::Fetch);
            }
        }
        async move { result.await }
    }
}
