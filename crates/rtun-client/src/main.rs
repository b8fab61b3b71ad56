//! rtun-client: reverse tunnel pairing agent.
//!
//! Dials the server's client-facing port, registers as the control channel,
//! and pairs each `NEW` notification with a fresh data connection and a
//! connection to the local target.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use rtun_client::config::ClientConfig;
use rtun_client::agent::ClientAgent;

/// rtun-client — reverse tunnel pairing agent
#[derive(Parser, Debug)]
#[command(name = "rtun-client", version, about = "Reverse tunnel pairing agent")]
struct Cli {
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

    info!(version = env!("CARGO_PKG_VERSION"), "starting rtun-client");

    let client_config = ClientConfig::load(
        cli.config.as_deref(),
        cli.server_addr.as_deref(),
        cli.target_addr.as_deref(),
        cli.reconnect_backoff_secs,
    )?;

    let agent = ClientAgent::new(client_config);

    tokio::select! {
        _ = agent.run() => {}
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("rtun-client stopped");
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
