//! The File Handle Service: a stable, opaque, variable-length identifier for
//! every filesystem object the server has ever looked up, backed by a
//! process-wide concurrent map (the "stateful" option discussed in
//! `SPEC_FULL.md` §4.4).

use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const MAX_HANDLE_LEN: usize = 64;
const HANDLE_LEN: usize = 16;

/// An opaque, stable byte string naming a filesystem object. Clients must
/// never attempt to interpret its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(pub Vec<u8>);

impl Handle {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Ok,
    Stale,
}

struct Inner {
    by_path: DashMap<PathBuf, Handle>,
    by_handle: DashMap<Handle, PathBuf>,
    is_dir: DashMap<Handle, bool>,
    exclusive_verifiers: DashMap<(PathBuf, Vec<u8>), [u8; 8]>,
    next_slot: AtomicU64,
}

/// Maps canonical, export-relative paths to opaque handles and back. Handles
/// minted for a path are stable for the lifetime of the process; they are
/// invalidated (removed) when the underlying object is deleted or renamed
/// away, at which point a later `resolve` correctly reports `Stale`.
#[derive(Clone)]
pub struct HandleService {
    inner: Arc<Inner>,
}

impl HandleService {
    pub fn new() -> Self {
        HandleService {
            inner: Arc::new(Inner {
                by_path: DashMap::new(),
                by_handle: DashMap::new(),
                is_dir: DashMap::new(),
                exclusive_verifiers: DashMap::new(),
                next_slot: AtomicU64::new(1),
            }),
        }
    }

    fn path_hash(path: &Path) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the existing handle for `path`, minting a new one if this is
    /// the first time the path has been seen. Idempotent: the same path
    /// always yields byte-identical handles within one process lifetime.
    /// `is_dir` records whether the object is a directory, for `is_directory`.
    pub fn handle_for(&self, path: &Path, is_dir: bool) -> Handle {
        if let Some(existing) = self.inner.by_path.get(path) {
            let handle = existing.clone();
            self.inner.is_dir.insert(handle.clone(), is_dir);
            return handle;
        }
        let slot = self.inner.next_slot.fetch_add(1, Ordering::Relaxed);
        let hash = Self::path_hash(path);
        let mut bytes = Vec::with_capacity(HANDLE_LEN);
        bytes.extend_from_slice(&hash.to_be_bytes());
        bytes.extend_from_slice(&slot.to_be_bytes());
        let handle = Handle(bytes);
        self.inner.by_path.insert(path.to_path_buf(), handle.clone());
        self.inner.by_handle.insert(handle.clone(), path.to_path_buf());
        self.inner.is_dir.insert(handle.clone(), is_dir);
        handle
    }

    /// Resolves a handle to its current path, or reports that it no longer
    /// names a live object.
    pub fn resolve(&self, handle: &Handle) -> Option<PathBuf> {
        self.inner.by_handle.get(handle).map(|p| p.clone())
    }

    /// Reports whether `handle` names a directory. Stale/unknown handles
    /// report `false`; callers that care about staleness check `resolve`
    /// first.
    pub fn is_directory(&self, handle: &Handle) -> bool {
        self.inner.is_dir.get(handle).map(|v| *v).unwrap_or(false)
    }

    /// Re-points `handle` at `new_path`, used after a successful RENAME so
    /// the moved object keeps the handle clients already hold.
    pub fn rebind(&self, old_path: &Path, new_path: &Path) {
        if let Some((_, handle)) = self.inner.by_path.remove(old_path) {
            self.inner.by_path.insert(new_path.to_path_buf(), handle.clone());
            self.inner.by_handle.insert(handle, new_path.to_path_buf());
        }
    }

    /// Forgets a handle entirely, used after a successful REMOVE/RMDIR so a
    /// stale handle correctly reports `Stale` rather than resolving to a
    /// path that no longer refers to the deleted object.
    pub fn invalidate(&self, path: &Path) {
        if let Some((_, handle)) = self.inner.by_path.remove(path) {
            self.inner.by_handle.remove(&handle);
            self.inner.is_dir.remove(&handle);
        }
    }

    /// Checks an EXCLUSIVE-mode CREATE's verifier against one already
    /// recorded for `(dir, name)`, recording it if none exists yet. Returns
    /// `true` if the create should proceed as idempotent success (no prior
    /// verifier, or the same one as before); `false` means a different
    /// client already claimed this name with a different verifier.
    pub fn check_exclusive(&self, dir: &Path, name: &[u8], verifier: [u8; 8]) -> bool {
        let key = (dir.to_path_buf(), name.to_vec());
        match self.inner.exclusive_verifiers.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(e) => *e.get() == verifier,
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(verifier);
                true
            }
        }
    }

    /// Forgets a recorded EXCLUSIVE verifier, used once the create has
    /// actually landed (so a later REMOVE + re-CREATE isn't treated as a
    /// retry of the original request) and on REMOVE of the name.
    pub fn forget_exclusive(&self, dir: &Path, name: &[u8]) {
        self.inner.exclusive_verifiers.remove(&(dir.to_path_buf(), name.to_vec()));
    }
}

impl Default for HandleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_yields_same_handle() {
        let svc = HandleService::new();
        let a = svc.handle_for(Path::new("/export/foo"), false);
        let b = svc.handle_for(Path::new("/export/foo"), false);
        assert_eq!(a, b);
        assert!(a.0.len() <= MAX_HANDLE_LEN);
    }

    #[test]
    fn different_paths_yield_different_handles() {
        let svc = HandleService::new();
        let a = svc.handle_for(Path::new("/export/foo"), false);
        let b = svc.handle_for(Path::new("/export/bar"), false);
        assert_ne!(a, b);
    }

    #[test]
    fn invalidated_handle_does_not_resolve() {
        let svc = HandleService::new();
        let h = svc.handle_for(Path::new("/export/foo"), false);
        svc.invalidate(Path::new("/export/foo"));
        assert_eq!(svc.resolve(&h), None);
    }

    #[test]
    fn rebind_follows_rename() {
        let svc = HandleService::new();
        let h = svc.handle_for(Path::new("/export/foo"), false);
        svc.rebind(Path::new("/export/foo"), Path::new("/export/baz"));
        assert_eq!(svc.resolve(&h), Some(PathBuf::from("/export/baz")));
    }

    #[test]
    fn is_directory_reflects_mint_time_flag() {
        let svc = HandleService::new();
        let file = svc.handle_for(Path::new("/export/foo"), false);
        let dir = svc.handle_for(Path::new("/export/sub"), true);
        assert!(!svc.is_directory(&file));
        assert!(svc.is_directory(&dir));
    }

    #[test]
    fn exclusive_verifier_matches_then_rejects_mismatch() {
        let svc = HandleService::new();
        let dir = Path::new("/export");
        assert!(svc.check_exclusive(dir, b"new.txt", [1u8; 8]));
        assert!(svc.check_exclusive(dir, b"new.txt", [1u8; 8]));
        assert!(!svc.check_exclusive(dir, b"new.txt", [2u8; 8]));
    }

    #[test]
    fn forget_exclusive_clears_recorded_verifier() {
        let svc = HandleService::new();
        let dir = Path::new("/export");
        assert!(svc.check_exclusive(dir, b"new.txt", [1u8; 8]));
        svc.forget_exclusive(dir, b"new.txt");
        assert!(svc.check_exclusive(dir, b"new.txt", [2u8; 8]));
    }
}
