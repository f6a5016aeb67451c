//! Libvirt hypervisor driver --- alternate back-end selectable via
//! `--hypervisor Libvirt` (design §6).
//!
//! Unlike the Docker driver, which talks a remote HTTP API directly, libvirt
//! exposes no portable remote-friendly binding outside of its own RPC
//! protocol; the idiomatic, dependency-light way to drive it from a
//! system-tools binary is the `virsh` client shelled out over SSH to the
//! target host --- a thin client issuing imperative commands against a
//! named host, one layer up from the Docker driver's own HTTP calls.

use async_trait::async_trait;
use tokio::process::Command;

use super::{HypervisorDriver, InstanceId, VnfIdentity};
use crate::error::{NfioError, NfioResult};

pub struct LibvirtDriver;

impl LibvirtDriver {
    pub fn new() -> Self {
        Self
    }

    async fn virsh(&self, host: &str, args: &[&str]) -> NfioResult<Vec<u8>> {
        let output = Command::new("ssh")
            .arg(host)
            .arg("virsh")
            .args(args)
            .output()
            .await
            .map_err(|_| NfioError::HypervisorConnection)?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(NfioError::HypervisorConnection)
        }
    }
}

impl Default for LibvirtDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HypervisorDriver for LibvirtDriver {
    async fn deploy(
        &self,
        identity: &VnfIdentity,
        image: &str,
        _privileged: bool,
    ) -> NfioResult<InstanceId> {
        identity.validate()?;
        if image.is_empty() {
            return Err(NfioError::InvalidIdentity);
        }
        self.virsh(&identity.host, &["define", image])
            .await
            .map_err(|_| NfioError::VnfDeploy)?;
        Ok(InstanceId(identity.fullname()))
    }

    async fn start(&self, identity: &VnfIdentity, _privileged: bool) -> NfioResult<()> {
        identity.validate()?;
        self.virsh(&identity.host, &["start", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfStart)?;
        Ok(())
    }

    async fn stop(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        self.virsh(&identity.host, &["shutdown", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfStop)?;
        Ok(())
    }

    async fn restart(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        self.virsh(&identity.host, &["reboot", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfRestart)?;
        Ok(())
    }

    async fn pause(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        self.virsh(&identity.host, &["suspend", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfPause)?;
        Ok(())
    }

    async fn unpause(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        self.virsh(&identity.host, &["resume", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfUnpause)?;
        Ok(())
    }

    async fn destroy(&self, identity: &VnfIdentity, force: bool) -> NfioResult<()> {
        identity.validate()?;
        let args: &[&str] =
            if force { &["destroy", &identity.fullname()] } else { &["undefine", &identity.fullname()] };
        self.virsh(&identity.host, args).await.map_err(|_| NfioError::VnfDestroy)?;
        Ok(())
    }

    async fn execute_in_guest(&self, identity: &VnfIdentity, command: &str) -> NfioResult<Vec<u8>> {
        identity.validate()?;
        self.virsh(&identity.host, &["qemu-agent-command", &identity.fullname(), command])
            .await
            .map_err(|_| NfioError::VnfCommandExecution)
    }

    async fn guest_status(&self, identity: &VnfIdentity) -> NfioResult<String> {
        identity.validate()?;
        let out = self
            .virsh(&identity.host, &["domstate", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfNotFound)?;
        Ok(String::from_utf8_lossy(&out).trim().to_owned())
    }

    async fn get_id(&self, identity: &VnfIdentity) -> NfioResult<InstanceId> {
        identity.validate()?;
        let out = self
            .virsh(&identity.host, &["domid", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfNotFound)?;
        Ok(InstanceId(String::from_utf8_lossy(&out).trim().to_owned()))
    }

    async fn get_ip(&self, identity: &VnfIdentity) -> NfioResult<String> {
        identity.validate()?;
        let out = self
            .virsh(&identity.host, &["domifaddr", &identity.fullname()])
            .await
            .map_err(|_| NfioError::VnfNotFound)?;
        Ok(String::from_utf8_lossy(&out).trim().to_owned())
    }
}
