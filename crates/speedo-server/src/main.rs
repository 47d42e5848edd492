//! speedo: browser speed-test measurement server
//!
//! Serves the client application, download/upload measurement endpoints,
//! result storage and a WebSocket latency channel on a plaintext and a TLS
//! port at the same time.

mod cli;

use anyhow::Context;
use clap::Parser;
use speedo_core::{Collaborators, Dispatcher, EchoChannel, Server};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    let args = cli::CliArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let config = args.into_config().resolve_paths(&cwd);

    info!(
        hostname = %config.hostname,
        http_port = config.http_port,
        https_port = config.https_port,
        web_root = %config.web_root.display(),
        workers = config.workers,
        "Starting speedo"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    // Ahead of creating the results directory
    config.check_web_root().context("Failed to start server")?;

    runtime.block_on(async {
        let collaborators = Collaborators::from_config(&config)
            .await
            .with_context(|| {
                format!("Failed to open results directory {}", config.results_dir.display())
            })?;
        let dispatcher = Dispatcher::new(&config, collaborators);

        let server = Server::bind(&config, dispatcher, Arc::new(EchoChannel))
            .await
            .context("Failed to start server")?;
        server.run().await?;

        info!("Server stopped");
        Ok::<_, anyhow::Error>(())
    })
}
