//! Server configuration: TOML file + environment + CLI overrides.
//!
//! Precedence: CLI flag > `PORT` environment variable > config file >
//! built-in default. TLS engages when both a certificate and key are
//! configured; otherwise the transport is plaintext (development mode).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use screenlink_proto::LinkResult;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_max_clients")]
    pub max_clients_per_session: usize,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            cert: None,
            key: None,
            max_clients_per_session: default_max_clients(),
            session_timeout_secs: default_session_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_max_clients() -> usize {
    5
}
fn default_session_timeout() -> u64 {
    24 * 3600
}
fn default_sweep_interval() -> u64 {
    300
}

/// Resolved server configuration (paths expanded, overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket signaling port. The HTTP status surface binds to
    /// `port + 1`.
    pub port: u16,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub max_clients_per_session: usize,
    pub session_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    /// Load config from TOML file, then apply environment and CLI
    /// overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_cert: Option<&str>,
        cli_key: Option<&str>,
        cli_max_clients: Option<usize>,
        cli_session_timeout: Option<u64>,
        cli_sweep_interval: Option<u64>,
    ) -> LinkResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content).map_err(|e| {
                    screenlink_proto::LinkError::Other(format!("config parse error: {e}"))
                })?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let env_port = std::env::var("PORT").ok().and_then(|v| match v.parse() {
            Ok(p) => Some(p),
            Err(_) => {
                warn!(value = %v, "ignoring unparseable PORT environment variable");
                None
            }
        });

        let port = cli_port.or(env_port).unwrap_or(file_config.server.port);
        let cert = cli_cert.map(|s| s.to_string()).or(file_config.server.cert);
        let key = cli_key.map(|s| s.to_string()).or(file_config.server.key);

        Ok(Self {
            port,
            cert_path: cert.as_deref().map(expand_tilde_str),
            key_path: key.as_deref().map(expand_tilde_str),
            max_clients_per_session: cli_max_clients
                .unwrap_or(file_config.server.max_clients_per_session),
            session_timeout_secs: cli_session_timeout
                .unwrap_or(file_config.server.session_timeout_secs),
            sweep_interval_secs: cli_sweep_interval
                .unwrap_or(file_config.server.sweep_interval_secs),
        })
    }

    /// TLS engages only when both halves of the pair are configured.
    pub fn tls_enabled(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }

    /// Port for the HTTP status surface, one above the signaling port.
    /// Port 65535 leaves no room for it and is rejected at startup.
    pub fn http_port(&self) -> LinkResult<u16> {
        self.port.checked_add(1).ok_or_else(|| {
            screenlink_proto::LinkError::Other(format!(
                "port {} leaves no room for the HTTP status port",
                self.port
            ))
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let section = ServerSection::default();
        assert_eq!(section.port, 3000);
        assert_eq!(section.max_clients_per_session, 5);
        assert_eq!(section.session_timeout_secs, 86_400);
        assert_eq!(section.sweep_interval_secs, 300);
    }

    #[test]
    fn cli_overrides_file_defaults() {
        let config =
            ServerConfig::load(None, Some(4000), None, None, Some(8), Some(3600), None).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_clients_per_session, 8);
        assert_eq!(config.session_timeout_secs, 3600);
        assert_eq!(config.sweep_interval_secs, 300);
        assert!(!config.tls_enabled());
    }

    #[test]
    fn http_port_is_adjacent_and_guards_the_top_of_the_range() {
        let config =
            ServerConfig::load(None, Some(3000), None, None, None, None, None).unwrap();
        assert_eq!(config.http_port().unwrap(), 3001);

        let config =
            ServerConfig::load(None, Some(u16::MAX), None, None, None, None, None).unwrap();
        assert!(config.http_port().is_err());
    }

    #[test]
    fn tls_requires_both_cert_and_key() {
        let config =
            ServerConfig::load(None, None, Some("/tmp/cert.pem"), None, None, None, None).unwrap();
        assert!(!config.tls_enabled());
        let config = ServerConfig::load(
            None,
            None,
            Some("/tmp/cert.pem"),
            Some("/tmp/key.pem"),
            None,
            None,
            None,
        )
        .unwrap();
        assert!(config.tls_enabled());
    }
}
