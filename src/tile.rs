//! Tile identity and payload types.
//!
//! The cacher core treats keys as opaque strings used only for equality
//! and hashing; the loader layer works with grid coordinates plus an
//! imagery version and renders them into the canonical key form.

use std::fmt;

use bytes::Bytes;

/// Tile coordinates in the imagery grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    /// Tile column (X coordinate in the grid).
    pub col: u32,
    /// Tile row (Y coordinate in the grid).
    pub row: u32,
    /// Zoom level.
    pub zoom: u8,
}

impl TileId {
    /// Create a new tile id.
    pub fn new(col: u32, row: u32, zoom: u8) -> Self {
        Self { col, row, zoom }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// Opaque, non-empty cache key.
///
/// The canonical form for tile-backed keys is
/// `"{version}/{zoom}/{col}/{row}"`; [`TileKey::for_tile`] renders it and
/// [`TileKey::parse_tile`] reverses it. Keys from other backends may use
/// any non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey(String);

impl TileKey {
    /// Create a key from an arbitrary non-empty string.
    ///
    /// # Panics
    ///
    /// Panics if the string is empty.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "tile key must be non-empty");
        Self(key)
    }

    /// Render the canonical key for a tile under an imagery version.
    pub fn for_tile(version: &str, tile: &TileId) -> Self {
        Self::new(format!("{version}/{tile}"))
    }

    /// Split a canonical key back into its version and tile id.
    ///
    /// Returns `None` for keys that are not in canonical form.
    pub fn parse_tile(&self) -> Option<(&str, TileId)> {
        let mut parts = self.0.rsplitn(4, '/');
        let row = parts.next()?.parse().ok()?;
        let col = parts.next()?.parse().ok()?;
        let zoom = parts.next()?.parse().ok()?;
        let version = parts.next()?;
        if version.is_empty() {
            return None;
        }
        Some((version, TileId { col, row, zoom }))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable tile payload.
///
/// Published once and then shared by readers as `Arc<CachedTile>`; cache
/// eviction drops only the cache's reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    data: Bytes,
    content_type: Option<String>,
}

impl CachedTile {
    /// Create a tile from raw payload bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// Attach the payload's media type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The payload bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The payload's media type, when known.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_id_display() {
        let tile = TileId::new(123, 456, 15);
        assert_eq!(tile.to_string(), "15/123/456");
    }

    #[test]
    fn test_key_for_tile_roundtrip() {
        let tile = TileId::new(12754, 5279, 16);
        let key = TileKey::for_tile("v2", &tile);
        assert_eq!(key.as_str(), "v2/16/12754/5279");
        assert_eq!(key.parse_tile(), Some(("v2", tile)));
    }

    #[test]
    fn test_key_parse_allows_slashes_in_version() {
        let key = TileKey::new("sat/2024/15/10/20");
        let (version, tile) = key.parse_tile().unwrap();
        assert_eq!(version, "sat/2024");
        assert_eq!(tile, TileId::new(10, 20, 15));
    }

    #[test]
    fn test_key_parse_rejects_non_canonical() {
        assert_eq!(TileKey::new("plain-key").parse_tile(), None);
        assert_eq!(TileKey::new("v1/a/b/c").parse_tile(), None);
        assert_eq!(TileKey::new("/15/1/2").parse_tile(), None);
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn test_empty_key_rejected() {
        TileKey::new("");
    }

    #[test]
    fn test_cached_tile_accessors() {
        let tile = CachedTile::new(vec![1u8, 2, 3]).with_content_type("image/png");
        assert_eq!(tile.len(), 3);
        assert!(!tile.is_empty());
        assert_eq!(tile.content_type(), Some("image/png"));
        assert_eq!(tile.data().as_ref(), &[1, 2, 3]);
    }
}
