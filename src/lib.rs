//! Tilerelay - request-coalescing tile cache and fetch coordinator
//!
//! This library sits between a tile-serving frontend and its backing stores
//! (HTTP origins, database-backed loaders). Clients ask for tiles by key;
//! the cacher returns a cached tile if present, otherwise it fetches the
//! tile from the backing store exactly once per key even under concurrent
//! demand and distributes the result to every waiter.
//!
//! The two coordination layers are:
//!
//! - [`cacher::TileCacher`] - coalesces concurrent gets for the same key,
//!   manages lock-until-set barriers for producers, and fronts a bounded
//!   in-memory tier ([`cache::BoundedTileCache`]).
//! - [`http::HttpClient`] - a fixed pool of keep-alive upstream workers
//!   with an overflow queue, connect retries, and per-request completion
//!   handles ([`completion::CompletionHandle`]).
//!
//! # Example
//!
//! ```ignore
//! use tilerelay::cacher::{CacherConfig, TileCacher};
//! use tilerelay::completion;
//! use tilerelay::tile::TileKey;
//!
//! let cacher = TileCacher::new(CacherConfig::default(), store);
//!
//! let (handle, result) = completion::channel();
//! cacher.get(&TileKey::new("v1/15/123/456"), handle);
//! let tile = result.await?;
//! ```

pub mod cache;
pub mod cacher;
pub mod completion;
pub mod error;
pub mod http;
pub mod loader;
pub mod tile;

/// Version of the tilerelay library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
