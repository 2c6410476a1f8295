//! Thin process launcher: parses configuration, wires up the reference
//! local-filesystem FSAL, and serves forever. See `SPEC_FULL.md` §2.11.

use clap::Parser;
use nfs_mamont::config::{Cli, ServerConfig};
use nfs_mamont::dispatcher::Dispatcher;
use nfs_mamont::fsal::local::LocalFsal;
use nfs_mamont::handle::HandleService;
use nfs_mamont::mount::MountState;
use nfs_mamont::{fresh_write_verifier, logging, server};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli)?;

    tracing::info!(
        export = %config.export_root.display(),
        listen = format!("{}:{}", config.listen_host, config.listen_port),
        "starting nfsd",
    );

    let fsal = LocalFsal::new(config.export_root.clone(), config.read_only);
    let handles = HandleService::new();
    let mount = MountState::new(config.export_root.clone(), config.export_path.clone());
    let dispatcher = Dispatcher::new(fsal, handles, mount, fresh_write_verifier());

    server::listen_and_serve(
        (config.listen_host.as_str(), config.listen_port),
        dispatcher,
        Duration::from_secs(config.idle_timeout_secs),
        config.max_fragment_len,
    )
    .await?;

    Ok(())
}
