//! Client configuration: TOML file + CLI overrides.

use rtun_core::RtunResult;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    #[serde(default)]
    pub target_addr: String,
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            target_addr: String::new(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
        }
    }
}

fn default_server_addr() -> String {
    "127.0.0.1:19090".to_string()
}
fn default_reconnect_backoff_secs() -> u64 {
    2
}

/// Resolved client configuration (CLI overrides already merged in).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Dial target for both the control channel and every data channel.
    pub server_addr: String,
    /// Dial target of the local service each paired stream is forwarded to.
    pub target_addr: String,
    /// Fixed sleep between control-session attempts.
    pub reconnect_backoff: Duration,
}

impl ClientConfig {
    /// Load configuration from an optional TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_server_addr: Option<&str>,
        cli_target_addr: Option<&str>,
        cli_reconnect_backoff_secs: Option<u64>,
    ) -> RtunResult<Self> {
        let file_config = load_file(config_path)?;

        let server_addr = cli_server_addr
            .map(str::to_string)
            .unwrap_or(file_config.client.server_addr);
        let target_addr = cli_target_addr
            .map(str::to_string)
            .unwrap_or(file_config.client.target_addr);
        let reconnect_backoff_secs =
            cli_reconnect_backoff_secs.unwrap_or(file_config.client.reconnect_backoff_secs);

        if target_addr.is_empty() {
            return Err(rtun_core::RtunError::Config(
                "target address must not be empty".to_string(),
            ));
        }

        Ok(Self {
            server_addr,
            target_addr,
            reconnect_backoff: Duration::from_secs(reconnect_backoff_secs),
        })
    }
}

fn load_file(config_path: Option<&Path>) -> RtunResult<ConfigFile> {
    let Some(path) = config_path else {
        return Ok(ConfigFile {
            client: ClientSection::default(),
        });
    };

    let expanded = expand_tilde(path);
    if !expanded.exists() {
        info!(path = %expanded.display(), "config file not found, using defaults");
        return Ok(ConfigFile {
            client: ClientSection::default(),
        });
    }

    info!(path = %expanded.display(), "loading config file");
    let content = std::fs::read_to_string(&expanded)?;
    toml::from_str(&content)
        .map_err(|e| rtun_core::RtunError::Config(format!("config parse error: {e}")))
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}
