use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use nfio::dispatcher::Dispatcher;
use nfio::error::NfioResult;
use nfio::handler::{DefaultHandler, TypeHandlerRegistry};
use nfio::hypervisor::{HypervisorDriver, InstanceId, VnfIdentity};

/// A hypervisor driver recording every call it receives, for asserting the
/// observed call sequence of the multi-step lifecycle protocols.
#[derive(Default)]
pub struct RecordingDriver {
    pub start_fails: bool,
    pub destroy_fails: bool,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl HypervisorDriver for RecordingDriver {
    async fn deploy(&self, identity: &VnfIdentity, image: &str, _privileged: bool) -> NfioResult<InstanceId> {
        self.calls.lock().unwrap().push(format!("deploy({},{},{})", identity.host, identity.fullname(), image));
        Ok(InstanceId(identity.fullname()))
    }

    async fn start(&self, identity: &VnfIdentity, _privileged: bool) -> NfioResult<()> {
        self.calls.lock().unwrap().push(format!("start({},{})", identity.host, identity.fullname()));
        if self.start_fails {
            Err(nfio::error::NfioError::VnfStart)
        } else {
            Ok(())
        }
    }

    async fn stop(&self, identity: &VnfIdentity) -> NfioResult<()> {
        self.calls.lock().unwrap().push(format!("stop({})", identity.fullname()));
        Ok(())
    }

    async fn restart(&self, _identity: &VnfIdentity) -> NfioResult<()> {
        Ok(())
    }

    async fn pause(&self, _identity: &VnfIdentity) -> NfioResult<()> {
        Ok(())
    }

    async fn unpause(&self, _identity: &VnfIdentity) -> NfioResult<()> {
        Ok(())
    }

    async fn destroy(&self, identity: &VnfIdentity, _force: bool) -> NfioResult<()> {
        self.calls.lock().unwrap().push(format!("destroy({})", identity.fullname()));
        if self.destroy_fails {
            Err(nfio::error::NfioError::VnfDestroy)
        } else {
            Ok(())
        }
    }

    async fn execute_in_guest(&self, _identity: &VnfIdentity, _command: &str) -> NfioResult<Vec<u8>> {
        Ok(b"0".to_vec())
    }

    async fn guest_status(&self, _identity: &VnfIdentity) -> NfioResult<String> {
        Ok("Running".to_owned())
    }

    async fn get_id(&self, identity: &VnfIdentity) -> NfioResult<InstanceId> {
        Ok(InstanceId(identity.fullname()))
    }

    async fn get_ip(&self, _identity: &VnfIdentity) -> NfioResult<String> {
        Ok("10.0.0.1".to_owned())
    }
}

pub fn dispatcher_with(tmp: &TempDir, driver: Arc<RecordingDriver>) -> Dispatcher {
    let mut registry = TypeHandlerRegistry::new();
    registry.register("firewall", Arc::new(DefaultHandler));
    let driver: Arc<dyn HypervisorDriver> = driver;
    Dispatcher::new(tmp.path().to_path_buf(), Path::new("/mnt/nfio").to_path_buf(), registry, driver)
}
