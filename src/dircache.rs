//! The process-wide directory-handle cache (§4.D).
//!
//! Opening the same directory twice is common in an operation graph (every relative open,
//! enumerate, or lock walks through its parent), so directory handles are shared via a
//! canonical-path-keyed cache. The cache holds only a [`WeakHandle`], mirroring the way the
//! teacher's [`crate::passthrough::BackingId`] lets a kernel-side resource outlive exactly as
//! long as something still references it and nothing longer — here the cache entry
//! disappears the moment the last [`Handle`] clone referencing that directory is dropped.
//!
//! There is no background sweeper thread: stale (no-longer-upgradable) entries are pruned
//! lazily, the next time anyone looks up that same path. A coarse `parking_lot::Mutex` guards
//! the whole map; directory opens are not hot enough in practice to need sharding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::handle::{Handle, WeakHandle};

struct CacheInner {
    entries: HashMap<PathBuf, WeakHandle>,
}

/// Process-wide cache of open directory handles, keyed by canonical path.
pub struct DirectoryCache {
    inner: Mutex<CacheInner>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
            }),
        }
    }

    /// Looks up a live handle for `path`, pruning the entry if its last strong reference has
    /// already gone away or if the handle's actual current path no longer matches `path` (it
    /// was relocated by a rename that didn't route through this cache, or raced one that did).
    pub fn get(&self, path: &Path) -> Option<Handle> {
        let mut inner = self.inner.lock();
        let handle = match inner.entries.get(path) {
            Some(weak) => weak.upgrade(),
            None => None,
        };
        match handle {
            Some(handle) if handle.path(true).map(|p| p == path).unwrap_or(false) => Some(handle),
            _ => {
                inner.entries.remove(path);
                None
            }
        }
    }

    /// Publishes `handle` under `path`, replacing any stale (no-longer-upgradable) entry.
    ///
    /// If a live handle is already cached for this path, that existing handle is returned
    /// instead and `handle` is dropped by the caller — the cache never holds two directory
    /// handles for the same canonical path at once.
    pub fn get_or_insert(&self, path: &Path, handle: Handle) -> Handle {
        let mut inner = self.inner.lock();
        if let Some(weak) = inner.entries.get(path) {
            if let Some(existing) = weak.upgrade() {
                return existing;
            }
        }
        inner.entries.insert(path.to_path_buf(), handle.downgrade());
        handle
    }

    /// Removes any cached entry for `path` outright, used when a directory is renamed or
    /// unlinked and must no longer be served to new lookups under its old name.
    pub fn invalidate(&self, path: &Path) {
        self.inner.lock().entries.remove(path);
    }

    /// Moves a live entry from `old` to `new`, as when a cached directory handle is renamed.
    /// `new` is overwritten unconditionally: `handle` is the authoritative occupant of that
    /// path now, so any (necessarily stale) entry already there is discarded.
    pub fn relocate(&self, old: &Path, new: &Path, handle: Handle) {
        let mut inner = self.inner.lock();
        inner.entries.remove(old);
        inner.entries.insert(new.to_path_buf(), handle.downgrade());
    }

    /// Drops every entry whose weak reference no longer upgrades. Exposed for the
    /// diagnostics/config surface (§4.I `directory_cache_enabled`); the cache also prunes
    /// incrementally on every `get`, so calling this is never required for correctness.
    pub fn prune(&self) {
        self.inner.lock().entries.retain(|_, weak| weak.is_live());
    }

    /// The number of live entries currently cached, after a prune pass.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.entries.retain(|_, weak| weak.is_live());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FileFlags;
    use crate::handle::ObjectKind;
    use nix::fcntl::OFlag;
    use nix::sys::stat::Mode;

    fn open_tmp_dir() -> (tempfile::TempDir, Handle) {
        let dir = tempfile::tempdir().unwrap();
        let fd = nix::fcntl::open(dir.path(), OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())
            .unwrap()
            .into_raw_fd();
        let handle = Handle::from_raw(
            fd,
            ObjectKind::Directory,
            FileFlags::READ,
            Some(dir.path().to_path_buf()),
            None,
        )
        .unwrap();
        (dir, handle)
    }

    #[test]
    fn shares_live_handle_for_same_path() {
        let cache = DirectoryCache::new();
        let (dir, handle) = open_tmp_dir();
        let first = cache.get_or_insert(dir.path(), handle);
        let (_dir2, handle2) = open_tmp_dir();
        let second = cache.get_or_insert(dir.path(), handle2);
        assert_eq!(first.identity(), second.identity());
    }

    #[test]
    fn prunes_dropped_entries() {
        let cache = DirectoryCache::new();
        let (dir, handle) = open_tmp_dir();
        {
            let inserted = cache.get_or_insert(dir.path(), handle);
            drop(inserted);
        }
        assert!(cache.get(dir.path()).is_none());
        assert_eq!(cache.len(), 0);
    }
}
