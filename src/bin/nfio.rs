//! Entry point: parse the CLI surface, bootstrap logging, construct the
//! hypervisor driver and dispatcher, and mount (design §6).

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nfio::config::Cli;
use nfio::dispatcher::Dispatcher;
use nfio::fuse_adapter;
use nfio::handler::{DefaultHandler, TypeHandlerRegistry};
use nfio::hypervisor::HypervisorFactory;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log_level.as_tracing_level().to_string()))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(%err, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let factory = HypervisorFactory::new(cli.hypervisor.into());
    let driver = Arc::from(factory.build());

    // Every `nf_type` directory resolves to the reference handler until a
    // real plug-in registry is wired up under `--middlebox_module_root`.
    let mut registry = TypeHandlerRegistry::new();
    registry.register("firewall", Arc::new(DefaultHandler));
    registry.register("loadbalancer", Arc::new(DefaultHandler));
    registry.register("proxy", Arc::new(DefaultHandler));
    tracing::info!(root = %cli.middlebox_module_root, "using reference type handler for all nf-types");

    let dispatcher = Dispatcher::new(cli.nfio_root.clone(), cli.nfio_mount.clone(), registry, driver);

    tracing::info!(
        root = %cli.nfio_root.display(),
        mount = %cli.nfio_mount.display(),
        hypervisor = %factory.kind(),
        "mounting nfio",
    );

    match fuse_adapter::mount(dispatcher, &cli.nfio_mount, runtime.handle().clone()) {
        Ok(()) => {
            tracing::info!("unmounted cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "mount failed");
            ExitCode::FAILURE
        }
    }
}
