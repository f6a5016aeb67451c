//! Inode table bridging `fuser`'s numeric inodes to mount-relative paths.
//!
//! The core dispatcher is path-keyed throughout; `fuser` is handle-keyed.
//! This table is the seam between the two, the same shape as an
//! id-to-path state table backing any handle-keyed protocol bridge.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Inode reserved for the mount root.
pub const ROOT_INO: u64 = 1;

pub struct InodeTable {
    inner: Mutex<Inner>,
}

struct Inner {
    next_ino: u64,
    paths: HashMap<u64, PathBuf>,
    by_path: HashMap<PathBuf, u64>,
}

impl InodeTable {
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut paths = HashMap::new();
        let mut by_path = HashMap::new();
        paths.insert(ROOT_INO, root.clone());
        by_path.insert(root, ROOT_INO);
        Self { inner: Mutex::new(Inner { next_ino: ROOT_INO + 1, paths, by_path }) }
    }

    pub fn path_of(&self, ino: u64) -> Option<PathBuf> {
        self.inner.lock().unwrap().paths.get(&ino).cloned()
    }

    /// Return the inode for `path`, allocating a new one on first sight.
    pub fn ensure(&self, path: &Path) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&ino) = inner.by_path.get(path) {
            return ino;
        }
        let ino = inner.next_ino;
        inner.next_ino += 1;
        inner.paths.insert(ino, path.to_path_buf());
        inner.by_path.insert(path.to_path_buf(), ino);
        ino
    }

    /// Drop the table entry for `path` (and any descendants) after a
    /// removal or rename.
    pub fn forget_prefix(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap();
        let victims: Vec<PathBuf> =
            inner.by_path.keys().filter(|p| p.starts_with(path)).cloned().collect();
        for victim in victims {
            if let Some(ino) = inner.by_path.remove(&victim) {
                inner.paths.remove(&ino);
            }
        }
    }

    /// Re-point every entry under `from` to the corresponding path under `to`
    /// after a rename.
    pub fn rename_prefix(&self, from: &Path, to: &Path) {
        let mut inner = self.inner.lock().unwrap();
        let victims: Vec<(PathBuf, u64)> = inner
            .by_path
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, &ino)| (p.clone(), ino))
            .collect();
        for (old_path, ino) in victims {
            let suffix = old_path.strip_prefix(from).unwrap_or(Path::new(""));
            let new_path = if suffix.as_os_str().is_empty() { to.to_path_buf() } else { to.join(suffix) };
            inner.by_path.remove(&old_path);
            inner.by_path.insert(new_path.clone(), ino);
            inner.paths.insert(ino, new_path);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_stable_for_repeated_paths() {
        let table = InodeTable::new();
        let a = table.ensure(Path::new("/nf-types/firewall/fw-a"));
        let b = table.ensure(Path::new("/nf-types/firewall/fw-a"));
        assert_eq!(a, b);
        assert_ne!(a, ROOT_INO);
    }

    #[test]
    fn rename_prefix_updates_descendants() {
        let table = InodeTable::new();
        let dir = table.ensure(Path::new("/nf-types/firewall/fw-a"));
        let child = table.ensure(Path::new("/nf-types/firewall/fw-a/action"));

        table.rename_prefix(Path::new("/nf-types/firewall/fw-a"), Path::new("/nf-types/firewall/fw-b"));

        assert_eq!(table.path_of(dir), Some(PathBuf::from("/nf-types/firewall/fw-b")));
        assert_eq!(table.path_of(child), Some(PathBuf::from("/nf-types/firewall/fw-b/action")));
    }
}
