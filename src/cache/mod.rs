//! Bounded in-memory tile cache.
//!
//! [`BoundedTileCache`] is the hot tier fronted by the cacher: a
//! fixed-capacity key/value store with LRU eviction and shared values.

mod bounded;
mod stats;

pub use bounded::BoundedTileCache;
pub use stats::CacheStats;
