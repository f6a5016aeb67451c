//! Default Type Handler (G) --- reference plug-in covering the stats and
//! action files every VNF type shares (design §4.4, §"Default Type Handler").
//!
//! Grounded on the reference middlebox handler, whose `special_files` set is
//! `{rx_bytes, tx_bytes, pkt_drops, status}` plus an `action_files` set of
//! `{action}`; this handler additionally intercepts `vm.ip` the way
//! `vnfs_get_ip` does, since design §3 lists it among the special files.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::attrs::{is_special_file, metadata_to_attr, Attr};
use crate::error::NfioResult;
use crate::hypervisor::{HypervisorDriver, VnfIdentity};
use crate::lifecycle::Keyword;
use crate::store::read_instance_config;

use super::{HandlerContext, TypeHandler};

/// Guest-side commands used to read counters via `execute_in_guest`. Every
/// back-end interprets these as a shell command run inside the VNF.
const RX_BYTES_CMD: &str = "cat /sys/class/net/eth0/statistics/rx_bytes";
const TX_BYTES_CMD: &str = "cat /sys/class/net/eth0/statistics/tx_bytes";
const PKT_DROPS_CMD: &str = "cat /sys/class/net/eth0/statistics/rx_dropped";

/// The stock handler every `nf_type` can reuse as-is or wrap.
pub struct DefaultHandler;

impl DefaultHandler {
    async fn identity_for(&self, ctx: &HandlerContext, path: &Path) -> NfioResult<(VnfIdentity, String)> {
        let instance_path = instance_dir(path);
        let full = crate::store::full_path(&ctx.root, &instance_path);
        let cfg = read_instance_config(&full).await?;
        let identity = VnfIdentity {
            host: cfg.host,
            user: ctx.ambient_user.clone(),
            instance_name: cfg.instance_name,
        };
        Ok((identity, cfg.image))
    }
}

/// Walk back up to `nf-types/<type>/<instance>` from any path beneath it.
fn instance_dir(path: &Path) -> std::path::PathBuf {
    let segments: Vec<&str> = path.iter().filter_map(|s| s.to_str()).collect();
    match segments.iter().position(|s| *s == "nf-types") {
        Some(idx) if segments.len() > idx + 2 => {
            segments[..=idx + 2].iter().collect::<std::path::PathBuf>()
        }
        _ => path.to_path_buf(),
    }
}

#[async_trait]
impl TypeHandler for DefaultHandler {
    async fn on_mkdir(&self, _ctx: &HandlerContext, instance_path: &Path, mode: u32) -> NfioResult<()> {
        crate::store::create_instance(instance_path, mode).await
    }

    async fn on_getattr(&self, ctx: &HandlerContext, path: &Path) -> NfioResult<Attr> {
        let full = crate::store::full_path(&ctx.root, path);
        let meta = tokio::fs::symlink_metadata(&full).await?;
        let leaf = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        Ok(metadata_to_attr(&meta, is_special_file(leaf)))
    }

    async fn on_read(
        &self,
        ctx: &HandlerContext,
        path: &Path,
        _len: usize,
        offset: u64,
    ) -> NfioResult<Option<Vec<u8>>> {
        let leaf = path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        let text = match leaf {
            "rx_bytes" | "tx_bytes" | "pkt_drops" => {
                let (identity, _image) = self.identity_for(ctx, path).await?;
                let cmd = match leaf {
                    "rx_bytes" => RX_BYTES_CMD,
                    "tx_bytes" => TX_BYTES_CMD,
                    _ => PKT_DROPS_CMD,
                };
                let raw = ctx.driver.execute_in_guest(&identity, cmd).await?;
                String::from_utf8_lossy(&raw).trim().to_owned()
            }
            "status" => {
                let (identity, _image) = self.identity_for(ctx, path).await?;
                ctx.driver.guest_status(&identity).await?
            }
            "vm.ip" => {
                let (identity, _image) = self.identity_for(ctx, path).await?;
                ctx.driver.get_ip(&identity).await?
            }
            _ => return Ok(None),
        };

        if offset as usize >= text.len() {
            Ok(Some(Vec::new()))
        } else {
            Ok(Some(text.as_bytes()[offset as usize..].to_vec()))
        }
    }

    async fn on_write(
        &self,
        ctx: &HandlerContext,
        path: &Path,
        buf: &[u8],
        offset: u64,
    ) -> NfioResult<Option<usize>> {
        let leaf = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if leaf != "action" {
            return Ok(None);
        }

        let Some(keyword) = Keyword::parse(buf) else {
            return Ok(None);
        };

        // Mirror the attempted keyword into the backing file before running
        // the lifecycle protocol: a failed activate/start/stop/destroy must
        // still leave the attempted keyword observable via read (design §7,
        // "User-visible failure").
        mirror_write(&ctx.root, path, buf, offset).await?;

        let (identity, image) = self.identity_for(ctx, path).await?;
        ctx.lifecycle.run(keyword, &identity, &image, false).await?;
        Ok(Some(buf.len()))
    }
}

/// Write `buf` at `offset` into the backing file for `path`, the same
/// passthrough shape the dispatcher itself uses for a plain write.
async fn mirror_write(root: &Path, path: &Path, buf: &[u8], offset: u64) -> NfioResult<()> {
    let backing = crate::store::full_path(root, path);
    let mut file = OpenOptions::new().write(true).open(&backing).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    file.write_all(buf).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn instance_dir_walks_up_from_nested_special_file() {
        let p = PathBuf::from("/nf-types/firewall/fw-a/machine/ip");
        assert_eq!(instance_dir(&p), PathBuf::from("/nf-types/firewall/fw-a"));
    }

    #[test]
    fn instance_dir_is_identity_for_non_nf_path() {
        let p = PathBuf::from("/etc/hosts");
        assert_eq!(instance_dir(&p), p);
    }
}
