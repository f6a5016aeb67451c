//! Error taxonomy shared by the hypervisor driver, the lifecycle coordinator
//! and the operation dispatcher.
//!
//! Every kind here carries the stable numeric code from the design's error
//! table (starting at 701, clear of `errno` range) so that logs and tests can
//! refer to a kind without depending on its `Display` text.

use std::fmt;

/// A single taxonomy entry: back-end/coordinator failures that eventually
/// cross the dispatcher boundary and get mapped to a POSIX errno.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NfioError {
    /// Back-end unreachable.
    HypervisorConnection,
    /// Named instance absent on host.
    VnfNotFound,
    /// `execute_in_guest` failure.
    VnfCommandExecution,
    /// Driver `create`-family failure.
    VnfCreate,
    /// `deploy` failure, or `activate` rollback succeeded.
    VnfDeploy,
    /// `destroy` failure.
    VnfDestroy,
    /// `start` failure.
    VnfStart,
    /// `restart` failure.
    VnfRestart,
    /// `stop` failure.
    VnfStop,
    /// `pause` failure.
    VnfPause,
    /// `unpause` failure.
    VnfUnpause,
    /// `activate` failed AND the compensating `destroy` also failed. The
    /// remote state is now unknown; only operator intervention resolves it.
    VnfDeployInconsistentState,
    /// A required identity field (`host`, `image`, `fullname`, ...) was empty.
    InvalidIdentity,
    /// Plain passthrough I/O against the backing store failed.
    Io(std::io::ErrorKind),
    /// No type handler is registered for the requested `nf_type`.
    UnknownType,
    /// A `HypervisorFactory` was asked to build a back-end kind conflicting
    /// with the one a prior factory in this process already committed to
    /// (design §8, "HypervisorFactory ... construction with a different
    /// type raises a type-conflict error").
    HypervisorKindConflict,
}

impl NfioError {
    /// The stable numeric code from the design's error table. `Io`,
    /// `UnknownType` and `HypervisorKindConflict` are dispatcher-/factory-
    /// local conditions that never leave the process as one of these codes,
    /// so they report 0.
    pub fn code(&self) -> u32 {
        match self {
            NfioError::HypervisorConnection => 701,
            NfioError::VnfNotFound => 702,
            NfioError::VnfCommandExecution => 703,
            NfioError::VnfCreate => 704,
            NfioError::VnfDeploy => 705,
            NfioError::VnfDestroy => 706,
            NfioError::VnfStart => 707,
            NfioError::VnfRestart => 708,
            NfioError::VnfStop => 709,
            NfioError::VnfPause => 710,
            NfioError::VnfUnpause => 711,
            NfioError::VnfDeployInconsistentState => 712,
            NfioError::InvalidIdentity
            | NfioError::Io(_)
            | NfioError::UnknownType
            | NfioError::HypervisorKindConflict => 0,
        }
    }

    /// Map this error to the errno the dispatcher returns to the kernel
    /// bridge (design §7, §4.1 "Error mapping").
    pub fn to_errno(self) -> i32 {
        match self {
            NfioError::VnfNotFound => libc::ENOENT,
            NfioError::HypervisorConnection => libc::EHOSTUNREACH,
            NfioError::VnfDeploy
            | NfioError::VnfDeployInconsistentState
            | NfioError::VnfDestroy
            | NfioError::VnfStart
            | NfioError::VnfRestart
            | NfioError::VnfStop
            | NfioError::VnfPause
            | NfioError::VnfUnpause
            | NfioError::VnfCommandExecution
            | NfioError::VnfCreate => libc::EIO,
            NfioError::InvalidIdentity => libc::EINVAL,
            NfioError::UnknownType => libc::ENOSYS,
            NfioError::HypervisorKindConflict => libc::EINVAL,
            NfioError::Io(kind) => io_kind_to_errno(kind),
        }
    }
}

fn io_kind_to_errno(kind: std::io::ErrorKind) -> i32 {
    use std::io::ErrorKind::*;
    match kind {
        NotFound => libc::ENOENT,
        PermissionDenied => libc::EACCES,
        AlreadyExists => libc::EEXIST,
        InvalidInput | InvalidData => libc::EINVAL,
        _ => libc::EIO,
    }
}

impl fmt::Display for NfioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfioError::HypervisorConnection => write!(f, "hypervisor back-end unreachable"),
            NfioError::VnfNotFound => write!(f, "VNF instance not found on host"),
            NfioError::VnfCommandExecution => write!(f, "command execution inside VNF failed"),
            NfioError::VnfCreate => write!(f, "driver create-family call failed"),
            NfioError::VnfDeploy => write!(f, "VNF deploy failed"),
            NfioError::VnfDestroy => write!(f, "VNF destroy failed"),
            NfioError::VnfStart => write!(f, "VNF start failed"),
            NfioError::VnfRestart => write!(f, "VNF restart failed"),
            NfioError::VnfStop => write!(f, "VNF stop failed"),
            NfioError::VnfPause => write!(f, "VNF pause failed"),
            NfioError::VnfUnpause => write!(f, "VNF unpause failed"),
            NfioError::VnfDeployInconsistentState => {
                write!(f, "activate failed and compensating destroy also failed")
            }
            NfioError::InvalidIdentity => write!(f, "host, image or instance name empty"),
            NfioError::Io(kind) => write!(f, "backing filesystem error: {kind:?}"),
            NfioError::UnknownType => write!(f, "no type handler registered for nf_type"),
            NfioError::HypervisorKindConflict => {
                write!(f, "conflicting hypervisor back-end kind requested")
            }
        }
    }
}

impl std::error::Error for NfioError {}

impl From<std::io::Error> for NfioError {
    fn from(err: std::io::Error) -> Self {
        NfioError::Io(err.kind())
    }
}

/// Convenience alias used throughout the crate.
pub type NfioResult<T> = Result<T, NfioError>;
