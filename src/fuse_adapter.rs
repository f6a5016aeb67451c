//! FUSE kernel bridge --- concrete realization of the out-of-scope "external
//! bridge" the core dispatcher is invoked by (design §5, "Scheduling
//! model").
//!
//! `fuser::Filesystem` is a synchronous, handle-keyed trait; the dispatcher
//! is async and path-keyed. This module is the seam: every callback blocks
//! the calling fuse worker thread on the tokio runtime via
//! [`tokio::runtime::Handle::block_on`], translates the call's inode to a
//! mount-relative path through [`InodeTable`], and maps [`NfioError`] to the
//! errno `fuser`'s reply types expect.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};

use crate::attrs::Attr;
use crate::dispatcher::Dispatcher;
use crate::inode::InodeTable;

/// TTL handed back on every attribute/entry reply. The backing store and the
/// remote VNF state can both change out from under the kernel cache at any
/// time, so the bridge declines to let the kernel cache anything.
const ATTR_TTL: Duration = Duration::ZERO;

pub struct NfioFilesystem {
    dispatcher: Dispatcher,
    inodes: InodeTable,
    rt: tokio::runtime::Handle,
}

impl NfioFilesystem {
    pub fn new(dispatcher: Dispatcher, rt: tokio::runtime::Handle) -> Self {
        Self { dispatcher, inodes: InodeTable::new(), rt }
    }

    fn path_for(&self, ino: u64) -> Option<PathBuf> {
        self.inodes.path_of(ino)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        let parent_path = self.path_for(parent)?;
        Some(parent_path.join(name))
    }

    fn to_file_attr(ino: u64, attr: &Attr) -> FileAttr {
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            crtime: attr.ctime,
            kind: if attr.is_dir { FileType::Directory } else { FileType::RegularFile },
            perm: (attr.mode & 0o7777) as u16,
            nlink: attr.nlink,
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
impl Filesystem for NfioFilesystem {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.getattr(&path)) {
            Ok(attr) => {
                let ino = self.inodes.ensure(&path);
                reply.entry(&ATTR_TTL, &Self::to_file_attr(ino, &attr), 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.getattr(&path)) {
            Ok(attr) => reply.attr(&ATTR_TTL, &Self::to_file_attr(ino, &attr)),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let result = self.rt.block_on(async {
            if let Some(mode) = mode {
                self.dispatcher.chmod(&path, mode).await?;
            }
            if uid.is_some() || gid.is_some() {
                self.dispatcher.chown(&path, uid, gid).await?;
            }
            if let Some(size) = size {
                self.dispatcher.truncate(&path, size).await?;
            }
            if atime.is_some() || mtime.is_some() {
                let a = atime.map(time_or_now_to_system_time);
                let m = mtime.map(time_or_now_to_system_time);
                self.dispatcher.utimens(&path, a, m).await?;
            }
            self.dispatcher.getattr(&path).await
        });

        match result {
            Ok(attr) => reply.attr(&ATTR_TTL, &Self::to_file_attr(ino, &attr)),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.readlink(&path)) {
            Ok(target) => reply.data(target.as_os_str().as_encoded_bytes()),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = self.rt.block_on(async {
            self.dispatcher.mkdir(&path, mode).await?;
            self.dispatcher.getattr(&path).await
        });
        match result {
            Ok(attr) => {
                let ino = self.inodes.ensure(&path);
                reply.entry(&ATTR_TTL, &Self::to_file_attr(ino, &attr), 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.unlink(&path)) {
            Ok(()) => {
                self.inodes.forget_prefix(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.rmdir(&path)) {
            Ok(()) => {
                self.inodes.forget_prefix(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, link_name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = self.rt.block_on(async {
            self.dispatcher.symlink(target, &path).await?;
            self.dispatcher.getattr(&path).await
        });
        match result {
            Ok(attr) => {
                let ino = self.inodes.ensure(&path);
                reply.entry(&ATTR_TTL, &Self::to_file_attr(ino, &attr), 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(from), Some(to)) = (self.child_path(parent, name), self.child_path(newparent, newname))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.rename(&from, &to)) {
            Ok(()) => {
                self.inodes.rename_prefix(&from, &to);
                reply.ok();
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (Some(source), Some(dest)) = (self.path_for(ino), self.child_path(newparent, newname))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = self.rt.block_on(async {
            self.dispatcher.link(&source, &dest).await?;
            self.dispatcher.getattr(&dest).await
        });
        match result {
            Ok(attr) => {
                let dest_ino = self.inodes.ensure(&dest);
                reply.entry(&ATTR_TTL, &Self::to_file_attr(dest_ino, &attr), 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.open(&path)) {
            Ok(()) => reply.opened(0, 0),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.read(&path, size as usize, offset.max(0) as u64)) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.write(&path, data, offset.max(0) as u64)) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.flush(&path)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.release(&path)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.fsync(&path)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.path_for(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let names = match self.rt.block_on(self.dispatcher.readdir(&path)) {
            Ok(names) => names,
            Err(err) => {
                reply.error(err.to_errno());
                return;
            }
        };

        for (i, name) in names.into_iter().enumerate().skip(offset.max(0) as usize) {
            let child_path = match name.as_str() {
                "." => path.clone(),
                ".." => path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.clone()),
                _ => path.join(&name),
            };
            let child_ino = self.inodes.ensure(&child_path);
            let kind = if name == "." || name == ".." {
                FileType::Directory
            } else {
                match self.rt.block_on(self.dispatcher.getattr(&child_path)) {
                    Ok(attr) if attr.is_dir => FileType::Directory,
                    _ => FileType::RegularFile,
                }
            };
            if reply.add(child_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.statfs(&path)) {
            Ok(stat) => reply.statfs(
                stat.f_blocks,
                stat.f_bfree,
                stat.f_bavail,
                stat.f_files,
                stat.f_ffree,
                stat.f_bsize as u32,
                stat.f_namemax as u32,
                stat.f_frsize as u32,
            ),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.rt.block_on(self.dispatcher.access(&path, mask)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = self.rt.block_on(async {
            self.dispatcher.create(&path, mode).await?;
            self.dispatcher.getattr(&path).await
        });
        match result {
            Ok(attr) => {
                let ino = self.inodes.ensure(&path);
                reply.created(&ATTR_TTL, &Self::to_file_attr(ino, &attr), 0, 0, 0);
            }
            Err(err) => reply.error(err.to_errno()),
        }
    }
}

fn time_or_now_to_system_time(t: fuser::TimeOrNow) -> SystemTime {
    match t {
        fuser::TimeOrNow::SpecificTime(t) => t,
        fuser::TimeOrNow::Now => SystemTime::now(),
    }
}

/// Mount and serve until the bridge is unmounted, at which point control
/// returns to the caller (design §6, "Exit code 0 only on clean unmount").
pub fn mount(
    dispatcher: Dispatcher,
    mount_point: &Path,
    rt: tokio::runtime::Handle,
) -> std::io::Result<()> {
    let fs = NfioFilesystem::new(dispatcher, rt);
    let options = [fuser::MountOption::FSName("nfio".to_owned())];
    fuser::mount2(fs, mount_point, &options)
}
