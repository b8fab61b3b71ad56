//! rtun-server: reverse tunnel rendezvous server.
//!
//! Accepts public TCP callers on one listener and a single client's control
//! and data channels on another, pairing each caller with a matching data
//! stream from the client and splicing the two.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use rtun_server::config::ServerConfig;
use rtun_server::engine::RendezvousEngine;

/// rtun-server — reverse tunnel rendezvous server
#[derive(Parser, Debug)]
#[command(name = "rtun-server", version, about = "Reverse tunnel rendezvous server")]
struct Cli {
    /// Public listen address (end users connect here)
    #[arg(long)]
    public_listen: Option<String>,

    /// Client-facing listen address (control and data channels)
    #[arg(long)]
    client_listen: Option<String>,

    /// Max time to wait for a matching data stream after notifying the client
    #[arg(long)]
    pair_timeout_secs: Option<u64>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting rtun-server");

    let server_config = match ServerConfig::load(
        cli.config.as_deref(),
        cli.public_listen.as_deref(),
        cli.client_listen.as_deref(),
        cli.pair_timeout_secs,
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let engine = RendezvousEngine::new(server_config);

    tokio::select! {
        result = engine.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("rtun-server stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
