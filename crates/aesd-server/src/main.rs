//! aesdsocket
//!
//! Serves the bounded command history on TCP port 9000 until SIGINT or
//! SIGTERM.

use aesd_logging::AesdSubscriberBuilder;
use aesd_server::{Cli, CommandServer};
use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let daemon = cli.daemon;
    let config = cli.into_config().context("invalid configuration")?;

    // Held for the life of the process so buffered file logs are flushed
    let _log_guard = AesdSubscriberBuilder::new()
        .with_config(config.log.clone())
        .init();

    if daemon {
        warn!("Daemon mode requested; running in the foreground");
    }

    let server = CommandServer::new(config)
        .await
        .context("failed to open command store")?;
    let addr = server.start().await.context("failed to start server")?;
    info!(%addr, "aesdsocket listening");

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to wait for SIGINT")?,
        _ = terminate.recv() => {}
    }
    info!("Caught signal, exiting");

    server.stop().await.context("failed to stop server")?;
    Ok(())
}
