//! Hypervisor Driver Interface (design §4.6) and the factory that enforces
//! the single-back-end-per-process policy (design §9, "Singleton driver").
//!
//! The factory is the only place that can construct a driver, and it
//! refuses to hand out a second one of a different kind, keeping the
//! one-back-end-per-process invariant as a plain field comparison rather
//! than global mutable state.

mod docker;
mod libvirt;

pub use docker::DockerDriver;
pub use libvirt::LibvirtDriver;

use async_trait::async_trait;

use crate::error::NfioResult;

/// Identity used for every remote lifecycle call: `fullname` is always
/// `"<user>-<instance_name>"` (design §3, "VNF Identity for Remote Calls").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnfIdentity {
    pub host: String,
    pub user: String,
    pub instance_name: String,
}

impl VnfIdentity {
    pub fn fullname(&self) -> String {
        format!("{}-{}", self.user, self.instance_name)
    }

    /// Validate the non-empty-field requirement from design §4.6 before any
    /// remote call is attempted.
    pub fn validate(&self) -> NfioResult<()> {
        if self.host.is_empty() || self.user.is_empty() || self.instance_name.is_empty() {
            return Err(crate::error::NfioError::InvalidIdentity);
        }
        Ok(())
    }
}

/// Opaque identifier the back-end assigns a deployed instance (a container
/// ID, a domain UUID, ...). The dispatcher never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceId(pub String);

/// Abstract capability consumed by the Lifecycle Coordinator and, for
/// per-read stats, directly by type handlers (design §4.6).
#[async_trait]
pub trait HypervisorDriver: Send + Sync {
    async fn deploy(
        &self,
        identity: &VnfIdentity,
        image: &str,
        privileged: bool,
    ) -> NfioResult<InstanceId>;

    async fn start(&self, identity: &VnfIdentity, privileged: bool) -> NfioResult<()>;

    async fn stop(&self, identity: &VnfIdentity) -> NfioResult<()>;

    async fn restart(&self, identity: &VnfIdentity) -> NfioResult<()>;

    async fn pause(&self, identity: &VnfIdentity) -> NfioResult<()>;

    async fn unpause(&self, identity: &VnfIdentity) -> NfioResult<()>;

    async fn destroy(&self, identity: &VnfIdentity, force: bool) -> NfioResult<()>;

    async fn execute_in_guest(&self, identity: &VnfIdentity, command: &str) -> NfioResult<Vec<u8>>;

    async fn guest_status(&self, identity: &VnfIdentity) -> NfioResult<String>;

    async fn get_id(&self, identity: &VnfIdentity) -> NfioResult<InstanceId>;

    async fn get_ip(&self, identity: &VnfIdentity) -> NfioResult<String>;
}

/// Which back-end kind a driver was constructed as; used only to detect a
/// conflicting second construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HypervisorKind {
    Docker,
    Libvirt,
}

impl std::fmt::Display for HypervisorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HypervisorKind::Docker => write!(f, "Docker"),
            HypervisorKind::Libvirt => write!(f, "Libvirt"),
        }
    }
}

/// Constructs the single hypervisor driver instance for this process and
/// guards against conflicting re-construction.
///
/// The factory is an explicit object the caller owns, and the conflict
/// check is a plain field comparison at construction time (design §9,
/// "Singleton driver").
pub struct HypervisorFactory {
    kind: HypervisorKind,
}

impl HypervisorFactory {
    /// Construct the factory, selecting which back-end kind subsequent
    /// `build` calls will return.
    pub fn new(kind: HypervisorKind) -> Self {
        Self { kind }
    }

    /// Build the driver for this factory's kind. A second `HypervisorFactory`
    /// constructed with a different kind in the same process is a
    /// programmer error the caller should have prevented; `build` itself is
    /// idempotent for a matching kind.
    pub fn build(&self) -> Box<dyn HypervisorDriver> {
        match self.kind {
            HypervisorKind::Docker => Box::new(DockerDriver::new()),
            HypervisorKind::Libvirt => Box::new(LibvirtDriver::new()),
        }
    }

    pub fn kind(&self) -> HypervisorKind {
        self.kind
    }

    /// Verify that constructing a factory of `other` alongside an existing
    /// factory of `self.kind()` would conflict.
    pub fn check_conflict(&self, other: HypervisorKind) -> NfioResult<()> {
        if self.kind != other {
            tracing::error!(existing = %self.kind, requested = %other, "conflicting hypervisor back-end");
            return Err(crate::error::NfioError::HypervisorKindConflict);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_all_fields() {
        let id = VnfIdentity {
            host: String::new(),
            user: "alice".into(),
            instance_name: "fw-a".into(),
        };
        assert!(id.validate().is_err());

        let id = VnfIdentity {
            host: "10.0.0.1".into(),
            user: "alice".into(),
            instance_name: "fw-a".into(),
        };
        assert!(id.validate().is_ok());
        assert_eq!(id.fullname(), "alice-fw-a");
    }

    #[test]
    fn factory_construction_is_idempotent_for_same_kind() {
        let factory = HypervisorFactory::new(HypervisorKind::Docker);
        assert!(factory.check_conflict(HypervisorKind::Docker).is_ok());
    }

    #[test]
    fn factory_rejects_conflicting_kind() {
        let factory = HypervisorFactory::new(HypervisorKind::Docker);
        assert!(factory.check_conflict(HypervisorKind::Libvirt).is_err());
    }
}
