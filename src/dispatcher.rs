//! Operation Dispatcher (E) --- routes every POSIX-style call either to a
//! type handler or to plain passthrough on the backing store (design §4.1).
//!
//! Grounded on the reference Passthrough filesystem class, with passthrough
//! I/O written the way a shadow filesystem drives `tokio::fs`
//! (seek-then-read_exact, `OpenOptions`, `spawn_blocking` for the
//! permission-bits calls `tokio::fs` has no async wrapper for).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::task;

use crate::ambient::current_user;
use crate::attrs::{is_special_file, metadata_to_attr, Attr};
use crate::error::{NfioError, NfioResult};
use crate::handler::{HandlerContext, TypeHandlerRegistry};
use crate::hypervisor::HypervisorDriver;
use crate::lifecycle::LifecycleCoordinator;
use crate::path::{classify, Opcode};
use crate::store::full_path;

/// Everything the dispatcher needs to service a call: the backing root, the
/// illusion-preserving mount point (for `readlink` rewriting), the type
/// handler registry, and the hypervisor machinery every handler call shares.
pub struct Dispatcher {
    root: PathBuf,
    mount: PathBuf,
    registry: TypeHandlerRegistry,
    driver: Arc<dyn HypervisorDriver>,
    lifecycle: Arc<LifecycleCoordinator>,
}

impl Dispatcher {
    pub fn new(
        root: PathBuf,
        mount: PathBuf,
        registry: TypeHandlerRegistry,
        driver: Arc<dyn HypervisorDriver>,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleCoordinator::new(driver.clone()));
        Self { root, mount, registry, driver, lifecycle }
    }

    fn handler_ctx(&self) -> HandlerContext {
        HandlerContext {
            root: self.root.clone(),
            driver: self.driver.clone(),
            lifecycle: self.lifecycle.clone(),
            ambient_user: current_user(),
        }
    }

    fn backing(&self, path: &Path) -> PathBuf {
        full_path(&self.root, path)
    }

    /// `getattr(path)` (design §4.1).
    pub async fn getattr(&self, path: &Path) -> NfioResult<Attr> {
        let classified = classify(path);
        if classified.opcode == Opcode::Nf && !classified.nf_type.is_empty() {
            if let Some(handler) = self.registry.resolve(&classified.nf_type) {
                return handler.on_getattr(&self.handler_ctx(), path).await;
            }
        }
        let backing = self.backing(path);
        let meta = fs::symlink_metadata(&backing).await?;
        Ok(metadata_to_attr(&meta, is_special_file(&classified.leaf_name)))
    }

    /// `readdir(path)` --- always passthrough (design §4.1).
    pub async fn readdir(&self, path: &Path) -> NfioResult<Vec<String>> {
        let backing = self.backing(path);
        let mut entries = fs::read_dir(&backing).await?;
        let mut names = vec![".".to_owned(), "..".to_owned()];
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// `mkdir(path, mode)` (design §4.1).
    pub async fn mkdir(&self, path: &Path, mode: u32) -> NfioResult<()> {
        let classified = classify(path);

        match classified.opcode {
            Opcode::Nf if classified.is_instance_dir(path) && !classified.nf_type.is_empty() => {
                let backing = self.backing(path);
                match self.registry.resolve(&classified.nf_type) {
                    Some(handler) => handler.on_mkdir(&self.handler_ctx(), &backing, mode).await,
                    None => Err(NfioError::UnknownType),
                }
            }
            Opcode::Nf => {
                let backing = self.backing(path);
                fs::create_dir(&backing).await?;
                fs::set_permissions(&backing, std::fs::Permissions::from_mode(mode)).await?;
                Ok(())
            }
            Opcode::Undefined => Err(NfioError::Io(std::io::ErrorKind::PermissionDenied)),
        }
    }

    /// `read(path, len, off, fh)` (design §4.1).
    pub async fn read(&self, path: &Path, len: usize, offset: u64) -> NfioResult<Vec<u8>> {
        let classified = classify(path);

        if classified.opcode == Opcode::Nf {
            if let Some(handler) = self.registry.resolve(&classified.nf_type) {
                if let Some(bytes) = handler.on_read(&self.handler_ctx(), path, len, offset).await? {
                    return Ok(bytes);
                }
            }
        }

        let backing = self.backing(path);
        let meta = fs::metadata(&backing).await?;
        let size = meta.len();
        if offset >= size {
            return Ok(Vec::new());
        }
        let to_read = std::cmp::min(len as u64, size - offset) as usize;
        let mut data = vec![0u8; to_read];
        let mut file = File::open(&backing).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.read_exact(&mut data).await?;
        Ok(data)
    }

    /// `write(path, buf, off, fh)` (design §4.1).
    pub async fn write(&self, path: &Path, buf: &[u8], offset: u64) -> NfioResult<usize> {
        let classified = classify(path);

        if classified.opcode == Opcode::Nf {
            if let Some(handler) = self.registry.resolve(&classified.nf_type) {
                if let Some(n) = handler.on_write(&self.handler_ctx(), path, buf, offset).await? {
                    return Ok(n);
                }
            }
        }

        let backing = self.backing(path);
        let mut file = OpenOptions::new().write(true).open(&backing).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(buf).await?;
        file.flush().await?;
        Ok(buf.len())
    }

    /// `unlink(path)` --- passthrough (design §4.1).
    pub async fn unlink(&self, path: &Path) -> NfioResult<()> {
        fs::remove_file(self.backing(path)).await.map_err(Into::into)
    }

    /// `rmdir(path)` --- passthrough.
    pub async fn rmdir(&self, path: &Path) -> NfioResult<()> {
        fs::remove_dir(self.backing(path)).await.map_err(Into::into)
    }

    /// `rename(from, to)` --- passthrough.
    pub async fn rename(&self, from: &Path, to: &Path) -> NfioResult<()> {
        fs::rename(self.backing(from), self.backing(to)).await.map_err(Into::into)
    }

    /// `link(source, dest)` --- passthrough.
    pub async fn link(&self, source: &Path, dest: &Path) -> NfioResult<()> {
        fs::hard_link(self.backing(source), self.backing(dest)).await.map_err(Into::into)
    }

    /// `symlink(target, link_path)` --- passthrough.
    pub async fn symlink(&self, target: &Path, link_path: &Path) -> NfioResult<()> {
        let dest = self.backing(link_path);
        let target = target.to_path_buf();
        task::spawn_blocking(move || std::os::unix::fs::symlink(&target, &dest))
            .await
            .map_err(|_| NfioError::Io(std::io::ErrorKind::Other))?
            .map_err(Into::into)
    }

    /// `readlink(path)`, rewriting a backing-root-prefixed target to begin
    /// with the mount point instead, preserving the illusion that links stay
    /// inside the mounted namespace (design §4.1).
    pub async fn readlink(&self, path: &Path) -> NfioResult<PathBuf> {
        let target = fs::read_link(self.backing(path)).await?;
        Ok(match target.strip_prefix(&self.root) {
            Ok(rest) => self.mount.join(rest),
            Err(_) => target,
        })
    }

    /// `chmod(path, mode)` --- passthrough.
    pub async fn chmod(&self, path: &Path, mode: u32) -> NfioResult<()> {
        fs::set_permissions(self.backing(path), std::fs::Permissions::from_mode(mode))
            .await
            .map_err(Into::into)
    }

    /// `chown(path, uid, gid)` --- passthrough. `tokio::fs` has no async
    /// wrapper for `chown`, so the blocking call runs on the blocking pool,
    /// the same dodge used elsewhere in this module for permission-bits
    /// calls.
    pub async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> NfioResult<()> {
        let backing = self.backing(path);
        task::spawn_blocking(move || {
            let c_path = std::ffi::CString::new(backing.as_os_str().as_encoded_bytes())
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
            let uid = uid.map(|v| v as libc::uid_t).unwrap_or(u32::MAX as libc::uid_t);
            let gid = gid.map(|v| v as libc::gid_t).unwrap_or(u32::MAX as libc::gid_t);
            let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
            if rc == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        })
        .await
        .map_err(|_| NfioError::Io(std::io::ErrorKind::Other))?
        .map_err(Into::into)
    }

    /// `truncate(path, size)` --- passthrough.
    pub async fn truncate(&self, path: &Path, size: u64) -> NfioResult<()> {
        let file = OpenOptions::new().write(true).open(self.backing(path)).await?;
        file.set_len(size).await.map_err(Into::into)
    }

    /// `utimens(path, atime, mtime)` --- passthrough via `filetime`-free
    /// blocking `utimensat` call, since `tokio::fs` exposes no timestamp
    /// setter.
    pub async fn utimens(
        &self,
        path: &Path,
        atime: Option<std::time::SystemTime>,
        mtime: Option<std::time::SystemTime>,
    ) -> NfioResult<()> {
        let backing = self.backing(path);
        task::spawn_blocking(move || set_times(&backing, atime, mtime))
            .await
            .map_err(|_| NfioError::Io(std::io::ErrorKind::Other))?
    }

    /// `open(path)` --- passthrough existence check; the dispatcher is
    /// stateless across calls, so `open` only validates the backing path is
    /// reachable.
    pub async fn open(&self, path: &Path) -> NfioResult<()> {
        fs::metadata(self.backing(path)).await?;
        Ok(())
    }

    /// `create(path, mode)` --- passthrough.
    pub async fn create(&self, path: &Path, mode: u32) -> NfioResult<()> {
        let backing = self.backing(path);
        OpenOptions::new().write(true).create(true).open(&backing).await?;
        fs::set_permissions(&backing, std::fs::Permissions::from_mode(mode)).await?;
        Ok(())
    }

    /// `flush`/`fsync`/`release` --- passthrough, no-ops beyond reachability
    /// since every call above already opens and closes its own handle.
    pub async fn flush(&self, _path: &Path) -> NfioResult<()> {
        Ok(())
    }

    pub async fn release(&self, _path: &Path) -> NfioResult<()> {
        Ok(())
    }

    pub async fn fsync(&self, path: &Path) -> NfioResult<()> {
        let file = File::open(self.backing(path)).await?;
        file.sync_all().await.map_err(Into::into)
    }

    /// `statfs(path)` --- passthrough via `libc::statvfs` on the blocking
    /// pool.
    pub async fn statfs(&self, path: &Path) -> NfioResult<libc::statvfs> {
        let backing = self.backing(path);
        task::spawn_blocking(move || {
            let c_path = std::ffi::CString::new(backing.as_os_str().as_encoded_bytes())
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
            let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
            let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
            if rc == 0 {
                Ok(stat)
            } else {
                Err(std::io::Error::last_os_error())
            }
        })
        .await
        .map_err(|_| NfioError::Io(std::io::ErrorKind::Other))?
        .map_err(Into::into)
    }

    /// `access(path, mode)` --- passthrough.
    pub async fn access(&self, path: &Path, mode: i32) -> NfioResult<()> {
        let backing = self.backing(path);
        task::spawn_blocking(move || {
            let c_path = std::ffi::CString::new(backing.as_os_str().as_encoded_bytes())
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
            let rc = unsafe { libc::access(c_path.as_ptr(), mode) };
            if rc == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        })
        .await
        .map_err(|_| NfioError::Io(std::io::ErrorKind::Other))?
        .map_err(Into::into)
    }
}

fn set_times(
    path: &Path,
    atime: Option<std::time::SystemTime>,
    mtime: Option<std::time::SystemTime>,
) -> NfioResult<()> {
    fn to_timespec(t: Option<std::time::SystemTime>) -> libc::timespec {
        match t {
            None => libc::timespec { tv_sec: 0, tv_nsec: libc::UTIME_OMIT },
            Some(t) => {
                let dur = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
                libc::timespec { tv_sec: dur.as_secs() as libc::time_t, tv_nsec: dur.subsec_nanos() as i64 }
            }
        }
    }

    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| NfioError::Io(std::io::ErrorKind::InvalidInput))?;
    let times = [to_timespec(atime), to_timespec(mtime)];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DefaultHandler;
    use crate::hypervisor::{HypervisorDriver, InstanceId, VnfIdentity};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NoopDriver;

    #[async_trait]
    impl HypervisorDriver for NoopDriver {
        async fn deploy(&self, _i: &VnfIdentity, _image: &str, _p: bool) -> NfioResult<InstanceId> {
            Ok(InstanceId("x".into()))
        }
        async fn start(&self, _i: &VnfIdentity, _p: bool) -> NfioResult<()> {
            Ok(())
        }
        async fn stop(&self, _i: &VnfIdentity) -> NfioResult<()> {
            Ok(())
        }
        async fn restart(&self, _i: &VnfIdentity) -> NfioResult<()> {
            Ok(())
        }
        async fn pause(&self, _i: &VnfIdentity) -> NfioResult<()> {
            Ok(())
        }
        async fn unpause(&self, _i: &VnfIdentity) -> NfioResult<()> {
            Ok(())
        }
        async fn destroy(&self, _i: &VnfIdentity, _f: bool) -> NfioResult<()> {
            Ok(())
        }
        async fn execute_in_guest(&self, _i: &VnfIdentity, _c: &str) -> NfioResult<Vec<u8>> {
            Ok(b"0".to_vec())
        }
        async fn guest_status(&self, _i: &VnfIdentity) -> NfioResult<String> {
            Ok("Running".into())
        }
        async fn get_id(&self, _i: &VnfIdentity) -> NfioResult<InstanceId> {
            Ok(InstanceId("x".into()))
        }
        async fn get_ip(&self, _i: &VnfIdentity) -> NfioResult<String> {
            Ok("10.0.0.1".into())
        }
    }

    fn dispatcher(root: PathBuf) -> Dispatcher {
        let mut registry = TypeHandlerRegistry::new();
        registry.register("firewall", Arc::new(DefaultHandler));
        let driver: Arc<dyn HypervisorDriver> = Arc::new(NoopDriver);
        Dispatcher::new(root, PathBuf::from("/mnt/nfio"), registry, driver)
    }

    #[tokio::test]
    async fn mkdir_under_type_dir_lays_down_instance_skeleton() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nf-types/firewall")).await.unwrap();
        let d = dispatcher(tmp.path().to_path_buf());

        d.mkdir(Path::new("/nf-types/firewall/fw-a"), 0o755).await.unwrap();

        assert!(tmp.path().join("nf-types/firewall/fw-a/status").exists());
        assert!(tmp.path().join("nf-types/firewall/fw-a/stats/rx_bytes").exists());
    }

    #[tokio::test]
    async fn mkdir_of_type_dir_itself_is_plain_passthrough() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("nf-types")).await.unwrap();
        let d = dispatcher(tmp.path().to_path_buf());

        d.mkdir(Path::new("/nf-types/firewall"), 0o755).await.unwrap();

        assert!(tmp.path().join("nf-types/firewall").is_dir());
    }

    #[tokio::test]
    async fn mkdir_outside_nf_types_is_permission_denied() {
        let tmp = TempDir::new().unwrap();
        let d = dispatcher(tmp.path().to_path_buf());

        let err = d.mkdir(Path::new("/not-nf/x"), 0o755).await.unwrap_err();
        assert_eq!(err, NfioError::Io(std::io::ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn read_past_offset_returns_empty_for_special_file() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nf-types/firewall")).await.unwrap();
        let d = dispatcher(tmp.path().to_path_buf());
        d.mkdir(Path::new("/nf-types/firewall/fw-a"), 0o755).await.unwrap();
        fs::write(tmp.path().join("nf-types/firewall/fw-a/machine/ip"), "10.0.0.7\n").await.unwrap();
        fs::write(tmp.path().join("nf-types/firewall/fw-a/machine/vm.image"), "fw-img\n")
            .await
            .unwrap();

        let status = d.read(Path::new("/nf-types/firewall/fw-a/status"), 1000, 0).await.unwrap();
        assert_eq!(status, b"Running");
        let eof = d
            .read(Path::new("/nf-types/firewall/fw-a/status"), 1000, 1000)
            .await
            .unwrap();
        assert!(eof.is_empty());
    }

    #[tokio::test]
    async fn write_of_activate_keyword_mirrors_bytes_and_runs_lifecycle() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nf-types/firewall")).await.unwrap();
        let d = dispatcher(tmp.path().to_path_buf());
        d.mkdir(Path::new("/nf-types/firewall/fw-a"), 0o755).await.unwrap();
        fs::write(tmp.path().join("nf-types/firewall/fw-a/machine/ip"), "10.0.0.7\n").await.unwrap();
        fs::write(tmp.path().join("nf-types/firewall/fw-a/machine/vm.image"), "fw-img\n")
            .await
            .unwrap();

        let n = d.write(Path::new("/nf-types/firewall/fw-a/action"), b"activate\n", 0).await.unwrap();
        assert_eq!(n, 9);

        let mirrored = fs::read(tmp.path().join("nf-types/firewall/fw-a/action")).await.unwrap();
        assert_eq!(mirrored, b"activate\n");
    }

    #[tokio::test]
    async fn readlink_rewrites_root_prefix_to_mount_point() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("real"), b"x").await.unwrap();
        fs::symlink(tmp.path().join("real"), tmp.path().join("link")).await.unwrap();
        let d = dispatcher(tmp.path().to_path_buf());

        let target = d.readlink(Path::new("/link")).await.unwrap();
        assert_eq!(target, PathBuf::from("/mnt/nfio/real"));
    }
}
