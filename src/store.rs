//! VNF Store --- lays down and reads back the on-disk skeleton of a VNF
//! instance (design §4.3).
//!
//! Every path here is a *backing* path, i.e. already `root ++ mount-relative
//! path`; this module knows nothing about the mount overlay.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::NfioResult;

const FILE_MODE_RW: u32 = 0o644;
const FILE_MODE_RO: u32 = 0o444;

/// Create the skeleton described in design §4.3 under `instance_path`.
/// `mode` is the caller-supplied directory mode, passed through to every
/// sub-directory's `mkdir`.
///
/// Failures are not rolled back: a half-built skeleton is a legitimate
/// observable outcome, matching the least-surprise contract of a
/// filesystem (a failed `mkdir` halfway through does not erase prior
/// side effects of the same call).
pub async fn create_instance(instance_path: &Path, mode: u32) -> NfioResult<()> {
    fs::create_dir(instance_path).await?;

    touch(&instance_path.join("status"), FILE_MODE_RW).await?;
    touch(&instance_path.join("action"), FILE_MODE_RW).await?;

    let config_dir = instance_path.join("config");
    fs::create_dir(&config_dir).await?;
    set_dir_mode(&config_dir, mode).await?;
    touch(&config_dir.join("boot.conf"), FILE_MODE_RW).await?;

    let machine_dir = instance_path.join("machine");
    fs::create_dir(&machine_dir).await?;
    set_dir_mode(&machine_dir, mode).await?;
    for name in ["ip", "vm.vcpu", "vm.memory", "vm.image", "vm.ip"] {
        touch(&machine_dir.join(name), FILE_MODE_RW).await?;
    }

    let stats_dir = instance_path.join("stats");
    fs::create_dir(&stats_dir).await?;
    set_dir_mode(&stats_dir, mode).await?;
    for name in ["rx_bytes", "tx_bytes", "pkt_drops"] {
        touch(&stats_dir.join(name), FILE_MODE_RO).await?;
    }

    Ok(())
}

async fn touch(path: &Path, mode: u32) -> NfioResult<()> {
    fs::File::create(path).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

async fn set_dir_mode(path: &Path, mode: u32) -> NfioResult<()> {
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

/// Configuration parameters read back from an instance directory, as
/// described by `read_instance_config` in design §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub instance_name: String,
    pub nf_type: String,
    pub host: String,
    pub image: String,
}

/// Read `machine/ip` and `machine/vm.image`, and derive the remaining
/// fields from `instance_path` itself.
pub async fn read_instance_config(instance_path: &Path) -> NfioResult<InstanceConfig> {
    let host = first_line(&instance_path.join("machine/ip")).await?;
    let image = first_line(&instance_path.join("machine/vm.image")).await?;

    let instance_name =
        instance_path.file_name().and_then(|s| s.to_str()).unwrap_or("").to_owned();

    let nf_type = nf_type_from_path(instance_path);

    Ok(InstanceConfig { instance_name, nf_type, host, image })
}

fn nf_type_from_path(instance_path: &Path) -> String {
    let segments: Vec<&str> = instance_path.iter().filter_map(|s| s.to_str()).collect();
    match segments.iter().position(|s| *s == "nf-types") {
        Some(idx) => segments.get(idx + 1).copied().unwrap_or("").to_owned(),
        None => String::new(),
    }
}

async fn first_line(path: &Path) -> NfioResult<String> {
    let contents = fs::read_to_string(path).await?;
    Ok(contents.lines().next().unwrap_or("").to_owned())
}

/// Full backing path helper shared by the dispatcher: join a mount-relative
/// path onto the configured root, stripping a leading `/` first.
pub fn full_path(root: &Path, relative: &Path) -> PathBuf {
    let relative = relative.strip_prefix("/").unwrap_or(relative);
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_instance_lays_down_full_skeleton() {
        let tmp = TempDir::new().unwrap();
        let instance = tmp.path().join("fw-a");

        create_instance(&instance, 0o755).await.unwrap();

        for rel in [
            "status",
            "action",
            "config/boot.conf",
            "machine/ip",
            "machine/vm.vcpu",
            "machine/vm.memory",
            "machine/vm.image",
            "machine/vm.ip",
            "stats/rx_bytes",
            "stats/tx_bytes",
            "stats/pkt_drops",
        ] {
            let path = instance.join(rel);
            assert!(path.exists(), "expected {rel} to exist");
        }

        let rw_mode = std::fs::metadata(instance.join("action")).unwrap().mode() & 0o777;
        assert_eq!(rw_mode, FILE_MODE_RW);
        let ro_mode = std::fs::metadata(instance.join("stats/rx_bytes")).unwrap().mode() & 0o777;
        assert_eq!(ro_mode, FILE_MODE_RO);
    }

    #[tokio::test]
    async fn read_instance_config_round_trips_ip_and_image() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nf-types").join("firewall");
        let instance = root.join("fw-a");
        create_instance(&instance, 0o755).await.unwrap();

        fs::write(instance.join("machine/ip"), "10.0.0.7\n").await.unwrap();
        fs::write(instance.join("machine/vm.image"), "fw-img\n").await.unwrap();

        let cfg = read_instance_config(&instance).await.unwrap();
        assert_eq!(cfg.instance_name, "fw-a");
        assert_eq!(cfg.nf_type, "firewall");
        assert_eq!(cfg.host, "10.0.0.7");
        assert_eq!(cfg.image, "fw-img");
    }

    #[test]
    fn full_path_strips_leading_slash() {
        let root = Path::new("/srv/nfio");
        assert_eq!(full_path(root, Path::new("/nf-types/fw")), root.join("nf-types/fw"));
        assert_eq!(full_path(root, Path::new("/")), root.to_path_buf());
    }
}
