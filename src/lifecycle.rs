//! Lifecycle Coordinator (F) --- composes hypervisor-driver calls into the
//! multi-step protocols a single `action` write triggers (design §4.5).

use std::sync::Arc;

use crate::error::{NfioError, NfioResult};
use crate::hypervisor::{HypervisorDriver, VnfIdentity};

/// A keyword recognized by the coordinator. Comparison is case-sensitive
/// after trimming a single trailing newline; anything else is a no-op at
/// this layer (design §4.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Keyword {
    Activate,
    Start,
    Stop,
    Destroy,
}

impl Keyword {
    /// Parse the bytes written to `action`. Returns `None` for unrecognized
    /// keywords, which the caller mirrors into the backing file without
    /// invoking the coordinator.
    pub fn parse(written: &[u8]) -> Option<Keyword> {
        let text = std::str::from_utf8(written).ok()?;
        let trimmed = text.strip_suffix('\n').unwrap_or(text);
        match trimmed {
            "activate" => Some(Keyword::Activate),
            "start" => Some(Keyword::Start),
            "stop" => Some(Keyword::Stop),
            "destroy" => Some(Keyword::Destroy),
            _ => None,
        }
    }
}

/// Coordinates deploy/start/stop/destroy protocols against a single
/// hypervisor driver.
pub struct LifecycleCoordinator {
    driver: Arc<dyn HypervisorDriver>,
}

impl LifecycleCoordinator {
    pub fn new(driver: Arc<dyn HypervisorDriver>) -> Self {
        Self { driver }
    }

    /// Run the keyword's protocol. Unknown keywords are the caller's
    /// responsibility to have already filtered out via [`Keyword::parse`].
    pub async fn run(
        &self,
        keyword: Keyword,
        identity: &VnfIdentity,
        image: &str,
        privileged: bool,
    ) -> NfioResult<()> {
        match keyword {
            Keyword::Activate => self.activate(identity, image, privileged).await,
            Keyword::Start => self.driver.start(identity, privileged).await.map_err(|_| NfioError::VnfStart),
            Keyword::Stop => self.driver.stop(identity).await.map_err(|_| NfioError::VnfStop),
            Keyword::Destroy => self.driver.destroy(identity, false).await.map_err(|_| NfioError::VnfDestroy),
        }
    }

    /// `activate`: deploy then start, with compensating destroy on a failed
    /// start (design §4.5's state diagram, §8's compensation property).
    ///
    /// Deploy happens-before start; a failed start happens-before the
    /// compensating destroy. Compensation is best-effort --- one attempt,
    /// no retries.
    async fn activate(
        &self,
        identity: &VnfIdentity,
        image: &str,
        privileged: bool,
    ) -> NfioResult<()> {
        identity.validate()?;

        self.driver.deploy(identity, image, privileged).await.map_err(|_| NfioError::VnfDeploy)?;

        match self.driver.start(identity, privileged).await {
            Ok(()) => Ok(()),
            Err(_) => match self.driver.destroy(identity, false).await {
                Ok(()) => Err(NfioError::VnfDeploy),
                Err(_) => Err(NfioError::VnfDeployInconsistentState),
            },
        }
    }
}
