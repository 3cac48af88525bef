//! Scoped producer lock over a set of keys.

use std::sync::Arc;

use crate::cacher::CacherShared;
use crate::tile::TileKey;

/// Guard owning a set of keys locked until set.
///
/// While the guard is alive, gets for the owned keys wait for the
/// producer's publication instead of fetching independently. Publishing
/// a key removes it from the barrier; dropping the guard releases the
/// remaining keys and fails their waiters with
/// [`ErrorKind::Cancelled`](crate::error::ErrorKind::Cancelled).
#[derive(Debug)]
pub struct CacherLock {
    shared: Arc<CacherShared>,
    keys: Vec<TileKey>,
}

impl CacherLock {
    pub(crate) fn new(shared: Arc<CacherShared>, keys: Vec<TileKey>) -> Self {
        Self { shared, keys }
    }

    /// The keys this guard actually locked.
    ///
    /// Keys that were already locked (or had a fetch in flight) at
    /// acquisition time are not part of the guard.
    pub fn keys(&self) -> &[TileKey] {
        &self.keys
    }

    /// Release the lock explicitly. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Drop for CacherLock {
    fn drop(&mut self) {
        self.shared.unlock(&self.keys);
    }
}
