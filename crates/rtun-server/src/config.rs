//! Server configuration: TOML file + CLI overrides.

use rtun_core::RtunResult;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_public_listen")]
    pub public_listen: String,
    #[serde(default = "default_client_listen")]
    pub client_listen: String,
    #[serde(default = "default_pair_timeout_secs")]
    pub pair_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            public_listen: default_public_listen(),
            client_listen: default_client_listen(),
            pair_timeout_secs: default_pair_timeout_secs(),
        }
    }
}

fn default_public_listen() -> String {
    "127.0.0.1:18080".to_string()
}
fn default_client_listen() -> String {
    "127.0.0.1:19090".to_string()
}
fn default_pair_timeout_secs() -> u64 {
    10
}

/// Resolved server configuration (CLI overrides already merged in).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the public listener (end users connect here).
    pub public_listen: String,
    /// Bind address for the client-facing listener (control + data).
    pub client_listen: String,
    /// Upper bound for awaiting a matching data stream after notifying the client.
    pub pair_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file, then apply CLI overrides.
    ///
    /// A `config_path` that does not exist is not an error: defaults are used
    /// silently. CLI arguments, when `Some`, take precedence over file values.
    pub fn load(
        config_path: Option<&Path>,
        cli_public_listen: Option<&str>,
        cli_client_listen: Option<&str>,
        cli_pair_timeout_secs: Option<u64>,
    ) -> RtunResult<Self> {
        let file_config = load_file(config_path)?;

        let public_listen = cli_public_listen
            .map(str::to_string)
            .unwrap_or(file_config.server.public_listen);
        let client_listen = cli_client_listen
            .map(str::to_string)
            .unwrap_or(file_config.server.client_listen);
        let pair_timeout_secs =
            cli_pair_timeout_secs.unwrap_or(file_config.server.pair_timeout_secs);

        if public_listen == client_listen {
            return Err(rtun_core::RtunError::Config(format!(
                "public-listen and client-listen must differ (both are {public_listen})"
            )));
        }

        Ok(Self {
            public_listen,
            client_listen,
            pair_timeout: Duration::from_secs(pair_timeout_secs),
        })
    }
}

fn load_file(config_path: Option<&Path>) -> RtunResult<ConfigFile> {
    let Some(path) = config_path else {
        return Ok(ConfigFile {
            server: ServerSection::default(),
        });
    };

    let expanded = expand_tilde(path);
    if !expanded.exists() {
        info!(path = %expanded.display(), "config file not found, using defaults");
        return Ok(ConfigFile {
            server: ServerSection::default(),
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
