//! Docker hypervisor driver --- the reference back-end (design §6).
//!
//! Talks to the Docker remote API over plain HTTP. The port, API version and
//! DNS list are driver-local constants, not part of the core contract; a
//! different back-end is free to pick its own.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{HypervisorDriver, InstanceId, VnfIdentity};
use crate::error::{NfioError, NfioResult};

const DOCKER_PORT: &str = "4444";
const DOCKER_API_VERSION: &str = "1.15";
const DOCKER_DNS: &[&str] = &["8.8.8.8"];

pub struct DockerDriver {
    client: reqwest::Client,
}

impl DockerDriver {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    fn base_url(&self, host: &str) -> String {
        format!("http://{host}:{DOCKER_PORT}/v{DOCKER_API_VERSION}")
    }

    fn map_transport_error(_err: reqwest::Error) -> NfioError {
        NfioError::HypervisorConnection
    }
}

impl Default for DockerDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct CreateContainerResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct InspectContainerResponse {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "State")]
    state: InspectState,
    #[serde(rename = "NetworkSettings")]
    network_settings: Option<NetworkSettings>,
}

#[derive(Deserialize)]
struct NetworkSettings {
    #[serde(rename = "IPAddress")]
    ip_address: String,
}

#[derive(Deserialize)]
struct InspectState {
    #[serde(rename = "Running")]
    running: bool,
    #[serde(rename = "Paused")]
    paused: bool,
    #[serde(rename = "Restarting")]
    restarting: bool,
}

#[async_trait]
impl HypervisorDriver for DockerDriver {
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
        let name = identity.fullname();
        let url = format!("{}/containers/create?name={name}", self.base_url(&identity.host));
        let body = json!({ "Image": image, "Hostname": name });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(NfioError::VnfDeploy);
        }
        let created: CreateContainerResponse =
            resp.json().await.map_err(|_| NfioError::VnfDeploy)?;
        Ok(InstanceId(created.id))
    }

    async fn start(&self, identity: &VnfIdentity, privileged: bool) -> NfioResult<()> {
        identity.validate()?;
        let url = format!(
            "{}/containers/{}/start",
            self.base_url(&identity.host),
            identity.fullname()
        );
        let body = json!({ "Dns": DOCKER_DNS, "Privileged": privileged });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            204 | 200 => Ok(()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfStart),
        }
    }

    async fn stop(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        let url =
            format!("{}/containers/{}/stop", self.base_url(&identity.host), identity.fullname());
        let resp =
            self.client.post(&url).send().await.map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            204 | 200 => Ok(()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfStop),
        }
    }

    async fn restart(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        let url = format!(
            "{}/containers/{}/restart",
            self.base_url(&identity.host),
            identity.fullname()
        );
        let resp =
            self.client.post(&url).send().await.map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            204 | 200 => Ok(()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfRestart),
        }
    }

    async fn pause(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        let url =
            format!("{}/containers/{}/pause", self.base_url(&identity.host), identity.fullname());
        let resp =
            self.client.post(&url).send().await.map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            204 | 200 => Ok(()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfPause),
        }
    }

    async fn unpause(&self, identity: &VnfIdentity) -> NfioResult<()> {
        identity.validate()?;
        let url = format!(
            "{}/containers/{}/unpause",
            self.base_url(&identity.host),
            identity.fullname()
        );
        let resp =
            self.client.post(&url).send().await.map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            204 | 200 => Ok(()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfUnpause),
        }
    }

    async fn destroy(&self, identity: &VnfIdentity, force: bool) -> NfioResult<()> {
        identity.validate()?;
        let url = format!(
            "{}/containers/{}?force={force}",
            self.base_url(&identity.host),
            identity.fullname()
        );
        let resp =
            self.client.delete(&url).send().await.map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            204 | 200 => Ok(()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfDestroy),
        }
    }

    async fn execute_in_guest(&self, identity: &VnfIdentity, command: &str) -> NfioResult<Vec<u8>> {
        identity.validate()?;
        let url = format!(
            "{}/containers/{}/exec",
            self.base_url(&identity.host),
            identity.fullname()
        );
        let body = json!({ "Cmd": ["/bin/sh", "-c", command], "AttachStdout": true });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            200 | 201 => Ok(resp.bytes().await.map_err(|_| NfioError::VnfCommandExecution)?.to_vec()),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::VnfCommandExecution),
        }
    }

    async fn guest_status(&self, identity: &VnfIdentity) -> NfioResult<String> {
        let inspected = self.inspect(identity).await?;
        if inspected.state.running {
            Ok("Running".to_owned())
        } else if inspected.state.paused {
            Ok("Paused".to_owned())
        } else if inspected.state.restarting {
            Ok("Restarting".to_owned())
        } else {
            Ok("Undefined".to_owned())
        }
    }

    async fn get_id(&self, identity: &VnfIdentity) -> NfioResult<InstanceId> {
        Ok(InstanceId(self.inspect(identity).await?.id))
    }

    async fn get_ip(&self, identity: &VnfIdentity) -> NfioResult<String> {
        let inspected = self.inspect(identity).await?;
        inspected
            .network_settings
            .map(|n| n.ip_address)
            .ok_or(NfioError::VnfNotFound)
    }
}

impl DockerDriver {
    async fn inspect(&self, identity: &VnfIdentity) -> NfioResult<InspectContainerResponse> {
        identity.validate()?;
        let url = format!(
            "{}/containers/{}/json",
            self.base_url(&identity.host),
            identity.fullname()
        );
        let resp = self.client.get(&url).send().await.map_err(Self::map_transport_error)?;
        match resp.status().as_u16() {
            200 => resp.json().await.map_err(|_| NfioError::VnfNotFound),
            404 => Err(NfioError::VnfNotFound),
            _ => Err(NfioError::HypervisorConnection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_uses_reference_constants() {
        let driver = DockerDriver::new();
        assert_eq!(driver.base_url("10.0.0.7"), "http://10.0.0.7:4444/v1.15");
    }

    #[tokio::test]
    async fn deploy_rejects_empty_image() {
        let driver = DockerDriver::new();
        let identity =
            VnfIdentity { host: "10.0.0.7".into(), user: "alice".into(), instance_name: "fw-a".into() };
        let err = driver.deploy(&identity, "", false).await.unwrap_err();
        assert_eq!(err, NfioError::InvalidIdentity);
    }
}
