//! CLI surface (design §6). Flag names are a stable contract; do not rename
//! without a deprecation path.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::hypervisor::HypervisorKind;

/// A user-space filesystem that exposes NFV orchestration as a directory
/// tree.
#[derive(Debug, Parser)]
#[command(name = "nfio", version, about)]
pub struct Cli {
    /// Absolute path to the backing directory the tree is rooted at.
    #[arg(long = "nfio_root")]
    pub nfio_root: PathBuf,

    /// Absolute path of the mount point.
    #[arg(long = "nfio_mount")]
    pub nfio_mount: PathBuf,

    /// Hypervisor back-end to drive VNF lifecycle calls through.
    #[arg(long = "hypervisor", value_enum, default_value_t = Hypervisor::Docker)]
    pub hypervisor: Hypervisor,

    /// Directory name under which type-handler modules are looked up.
    #[arg(long = "middlebox_module_root", default_value = "middleboxes")]
    pub middlebox_module_root: String,

    /// Minimum severity emitted to the tracing subscriber.
    #[arg(long = "log_level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Hypervisor {
    Docker,
    Libvirt,
}

impl From<Hypervisor> for HypervisorKind {
    fn from(value: Hypervisor) -> Self {
        match value {
            Hypervisor::Docker => HypervisorKind::Docker,
            Hypervisor::Libvirt => HypervisorKind::Libvirt,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Map onto the `tracing` severity the subscriber understands;
    /// `Critical` has no direct `tracing::Level` counterpart and is treated
    /// as `Error`, the nearest level tracing exposes.
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn hypervisor_defaults_to_docker() {
        let cli = Cli::parse_from([
            "nfio",
            "--nfio_root",
            "/srv/nfio",
            "--nfio_mount",
            "/mnt/nfio",
        ]);
        assert_eq!(cli.hypervisor, Hypervisor::Docker);
        assert_eq!(cli.middlebox_module_root, "middleboxes");
    }
}
