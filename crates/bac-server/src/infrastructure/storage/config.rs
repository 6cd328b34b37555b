//! TOML-based configuration persistence for the server.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Bac\config.toml`
//! - Linux:    `~/.config/bac/config.toml`
//! - macOS:    `~/Library/Application Support/Bac/config.toml`
//!
//! or to an explicit path given on the command line.  Example:
//!
//! ```toml
//! [server]
//! name = "Living Room"
//! slots = ["Player 1", "Player 2"]
//!
//! [network]
//! bind_address = "0.0.0.0"
//! port = 0
//! broadcast_interval_ms = 1000
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "...")]` so that an empty or partial
//! file is valid, and a missing file behaves exactly like an empty one.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bac_core::protocol::DEFAULT_BROADCAST_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::server::ServerOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address field does not hold an IP address.
    #[error("invalid {field} {value:?}: {source}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
}

/// Identity, slots and host-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Name carried in the discovery announcement.
    #[serde(default = "default_name")]
    pub name: String,
    /// Slot names, in index order.  Empty means the binary picks defaults.
    #[serde(default)]
    pub slots: Vec<String>,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay between two passes of the event loop.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// `"0.0.0.0"` binds all interfaces, `"127.0.0.1"` local connections only.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Control port; `0` picks any free port.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
    /// Address to announce instead of the bound one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,
    /// Upper bound on simultaneous sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    "bac server".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_ms() -> u64 {
    5
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_broadcast_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}
fn default_broadcast_interval_ms() -> u64 {
    1000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            slots: Vec::new(),
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: 0,
            broadcast_address: default_broadcast_address(),
            broadcast_port: default_broadcast_port(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            advertise_address: None,
            max_sessions: None,
        }
    }
}

impl AppConfig {
    /// Converts the file settings into runtime [`ServerOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if an address field does not
    /// parse as an IP address.
    pub fn to_options(&self) -> Result<ServerOptions, ConfigError> {
        let net = &self.network;
        let broadcast_ip = parse_ip("broadcast_address", &net.broadcast_address)?;
        let advertise_address = net
            .advertise_address
            .as_deref()
            .map(|value| parse_ip("advertise_address", value))
            .transpose()?;

        Ok(ServerOptions {
            name: self.server.name.clone(),
            bind_address: parse_ip("bind_address", &net.bind_address)?,
            port: net.port,
            broadcast_target: SocketAddr::new(broadcast_ip, net.broadcast_port),
            broadcast_interval: Duration::from_millis(net.broadcast_interval_ms),
            advertise_address,
            max_sessions: net.max_sessions,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.server.poll_interval_ms.max(1))
    }
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
        source,
    })
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let dir = platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(dir.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads the config from the platform default location.
///
/// # Errors
///
/// See [`config_file_path`] and [`load_config`].
pub fn load_default_config() -> Result<AppConfig, ConfigError> {
    load_config(&config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory joined with the app folder.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Bac"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("bac"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Bac"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
