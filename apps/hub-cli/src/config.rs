//! CLI configuration.
//!
//! Stored as TOML, by default at `~/.config/hubwire/cli.toml`:
//!
//! ```toml
//! base_uri = "https://app.example.com"
//! page_uri = "https://app.example.com/jobs"
//!
//! [cookies]
//! session = "abc123"
//!
//! [connection]
//! server_timeout_secs = 30
//! reconnect_delays_secs = [0, 2, 10, 30]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hubwire_client::{ConnectionConfig, Navigation, ReconnectPolicy};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base address of the service; the hub lives at `{base_uri}/signalRHub`.
    #[serde(default = "default_base_uri")]
    pub base_uri: String,

    /// Address of the page the client acts for. Cookies are scoped to its
    /// host. Defaults to `base_uri`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_uri: Option<String>,

    /// Request cookies forwarded on the WebSocket upgrade.
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    #[serde(default)]
    pub connection: ConnectionSettings,
}

/// Transport overrides, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u64,

    /// 0 disables client pings.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Delay before each reconnect attempt. Empty disables reconnection.
    #[serde(default = "default_reconnect_delays")]
    pub reconnect_delays_secs: Vec<u64>,
}

fn default_base_uri() -> String {
    "http://localhost:5000".into()
}

fn default_server_timeout() -> u64 {
    ConnectionConfig::default().server_timeout.as_secs()
}

fn default_keep_alive() -> u64 {
    ConnectionConfig::default().keep_alive_interval.as_secs()
}

fn default_handshake_timeout() -> u64 {
    ConnectionConfig::default().handshake_timeout.as_secs()
}

fn default_reconnect_delays() -> Vec<u64> {
    ReconnectPolicy::default()
        .delays
        .iter()
        .map(Duration::as_secs)
        .collect()
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            server_timeout_secs: default_server_timeout(),
            keep_alive_secs: default_keep_alive(),
            handshake_timeout_secs: default_handshake_timeout(),
            reconnect_delays_secs: default_reconnect_delays(),
        }
    }
}

impl ConnectionSettings {
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            server_timeout: Duration::from_secs(self.server_timeout_secs),
            keep_alive_interval: Duration::from_secs(self.keep_alive_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            reconnect: ReconnectPolicy {
                delays: self
                    .reconnect_delays_secs
                    .iter()
                    .copied()
                    .map(Duration::from_secs)
                    .collect(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_uri: default_base_uri(),
            page_uri: None,
            cookies: BTreeMap::new(),
            connection: ConnectionSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or writes and returns the defaults
    /// if the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Cookies may hold session tokens.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn navigation(&self) -> Navigation {
        let navigation = Navigation::new(self.base_uri.clone());
        match &self.page_uri {
            Some(page) => navigation.with_uri(page.clone()),
            None => navigation,
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("hubwire").join("cli.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("hubwire")
            .join("cli.toml"))
    }
}
