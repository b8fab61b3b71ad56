//! rtun — reverse TCP tunnel.
//!
//! Combines the rendezvous server and the pairing client into one binary
//! with `server` and `client` subcommands, mirroring how the two halves of
//! this system are deployed as a single tool in practice.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use rtun_client::agent::ClientAgent;
use rtun_client::config::ClientConfig;
use rtun_server::config::ServerConfig;
use rtun_server::engine::RendezvousEngine;

/// rtun — reverse TCP tunnel
#[derive(Parser)]
#[command(name = "rtun", version, about = "Reverse TCP tunnel: server and client in one binary")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the rendezvous server
    Server {
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
    },

    /// Start the pairing client
    Client {
        /// Server's client-facing address (dial target for control and data)
        #[arg(long)]
        server_addr: Option<String>,

        /// Local target address each paired stream is forwarded to
        #[arg(long)]
        target_addr: Option<String>,

        /// Fixed sleep between control-session reconnect attempts
        #[arg(long)]
        reconnect_backoff_secs: Option<u64>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
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

    match cli.command {
        Command::Server {
            public_listen,
            client_listen,
            pair_timeout_secs,
            config,
        } => run_server(config, public_listen, client_listen, pair_timeout_secs).await,
        Command::Client {
            server_addr,
            target_addr,
            reconnect_backoff_secs,
            config,
        } => run_client(config, server_addr, target_addr, reconnect_backoff_secs).await,
    }
}

async fn run_server(
    config: Option<PathBuf>,
    public_listen: Option<String>,
    client_listen: Option<String>,
    pair_timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting rtun server");

    let server_config = match ServerConfig::load(
        config.as_deref(),
        public_listen.as_deref(),
        client_listen.as_deref(),
        pair_timeout_secs,
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

    info!("rtun server stopped");
    Ok(())
}

async fn run_client(
    config: Option<PathBuf>,
    server_addr: Option<String>,
    target_addr: Option<String>,
    reconnect_backoff_secs: Option<u64>,
) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting rtun client");

    let client_config = ClientConfig::load(
        config.as_deref(),
        server_addr.as_deref(),
        target_addr.as_deref(),
        reconnect_backoff_secs,
    )?;

    let agent = ClientAgent::new(client_config);

    tokio::select! {
        _ = agent.run() => {}
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("rtun client stopped");
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
