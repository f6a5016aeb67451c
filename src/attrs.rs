//! Attribute translation shared by passthrough and type-handler `getattr`
//! paths.
//!
//! Grounded on the same `lstat`-to-attribute mapping the reference Python
//! implementation performs inline in `getattr`, and on a shadow
//! filesystem's metadata conversion helpers.

use std::os::unix::fs::MetadataExt;
use std::time::SystemTime;

/// The size reported for any special file regardless of its on-disk size
/// (design §3, "Special File"). Large enough that line-oriented readers
/// like `cat` do not truncate on a stale stat.
pub const SPECIAL_FILE_SIZE: u64 = 1000;

/// Attribute record the dispatcher hands back to the bridge for `getattr`.
/// Carries the subset of `lstat` fields a FUSE reply needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub is_dir: bool,
}

/// Convert a `std::fs::Metadata` into an [`Attr`], honoring the special-file
/// size override when `special` is true.
pub fn metadata_to_attr(meta: &std::fs::Metadata, special: bool) -> Attr {
    Attr {
        mode: meta.mode(),
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        size: if special { SPECIAL_FILE_SIZE } else { meta.len() },
        atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ctime: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(meta.ctime().max(0) as u64),
        is_dir: meta.is_dir(),
    }
}

/// The set of leaf names every special file belongs to, per the reference
/// type handler (design §4.4).
pub const SPECIAL_FILE_NAMES: &[&str] =
    &["rx_bytes", "tx_bytes", "pkt_drops", "status", "vm.ip", "action"];

pub fn is_special_file(leaf_name: &str) -> bool {
    SPECIAL_FILE_NAMES.contains(&leaf_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_file_names_cover_reference_handler_set() {
        assert!(is_special_file("rx_bytes"));
        assert!(is_special_file("action"));
        assert!(!is_special_file("boot.conf"));
    }
}
