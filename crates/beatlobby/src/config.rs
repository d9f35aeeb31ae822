//! Settings file.
//!
//! Loaded once at startup from a TOML file. Every field has a default, so
//! a missing file is replaced by a freshly written one and the server
//! starts anyway. Only the `[access]` and `[songs]` sections change at
//! runtime, through admin operations that rewrite the file immediately.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use beatlobby_lobby::{LobbyConfig, SongOrder};
use beatlobby_protocol::Difficulty;
use beatlobby_session::AccessList;
use beatlobby_transport::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Errors while reading or writing the settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A bind address that does not parse as `ip:port`.
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

/// The complete settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub observers: ObserverSettings,
    pub lobby: LobbySettings,
    pub songs: SongSettings,
    pub access: AccessList,
    pub directory: DirectorySettings,
    pub logging: LoggingSettings,
}

/// Identity and player listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Display name announced to directory servers.
    pub name: String,
    /// Address announced to directory servers.
    pub address: String,
    /// Local interface the player listener binds to.
    pub bind: String,
    pub port: u16,
    /// Largest accepted frame payload in bytes.
    pub max_frame_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "New Server".into(),
            address: "127.0.0.1".into(),
            bind: "0.0.0.0".into(),
            port: 3700,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// WebSocket listener for passive observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 3701,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    /// Voting countdown length in seconds.
    pub lobby_time_secs: u64,
    pub preferred_difficulty: Difficulty,
    pub song_order: SongOrder,
    /// Lobby polling interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Roster broadcasts per second.
    pub roster_rate_hz: u32,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            lobby_time_secs: 60,
            preferred_difficulty: Difficulty::ExpertPlus,
            song_order: SongOrder::Voting,
            tick_interval_ms: 5,
            roster_rate_hz: 20,
        }
    }
}

/// Where the catalog comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongSettings {
    /// Directory holding one sub-directory per song.
    pub directory: PathBuf,
    /// External ids to load, in catalog order. Empty loads every song in
    /// the directory.
    pub ids: Vec<u32>,
}

impl Default for SongSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("songs"),
            ids: Vec::new(),
        }
    }
}

/// Port assumed for a directory entry that does not name one.
pub const DEFAULT_DIRECTORY_PORT: u16 = 3700;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    /// Directory servers as `host` or `host:port`.
    pub servers: Vec<String>,
    pub handshake_timeout_secs: u64,
}

impl DirectorySettings {
    /// `servers` as connectable `host:port` strings.
    pub fn addresses(&self) -> Vec<String> {
        self.servers.iter().map(|s| with_default_port(s.trim())).collect()
    }
}

fn with_default_port(entry: &str) -> String {
    if entry.parse::<SocketAddr>().is_ok() {
        return entry.to_owned();
    }
    if let Ok(IpAddr::V6(ip)) = entry.parse::<IpAddr>() {
        return format!("[{ip}]:{DEFAULT_DIRECTORY_PORT}");
    }
    match entry.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            entry.to_owned()
        }
        _ => format!("{entry}:{DEFAULT_DIRECTORY_PORT}"),
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            handshake_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// "trace", "debug", "info", "warn" or "error". `RUST_LOG` wins.
    pub level: String,
    /// "text" or "json".
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Settings {
    /// Reads the settings file, writing the defaults to `path` first if it
    /// does not exist yet.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                settings.save(path)?;
                info!(path = %path.display(), "wrote default settings file");
                Ok(settings)
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the settings back to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The lobby's view of these settings.
    pub fn lobby_config(&self) -> LobbyConfig {
        LobbyConfig {
            lobby_time: Duration::from_secs(self.lobby.lobby_time_secs),
            preferred_difficulty: self.lobby.preferred_difficulty,
            song_order: self.lobby.song_order,
            roster_rate_hz: self.lobby.roster_rate_hz,
            ..LobbyConfig::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.lobby.tick_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.directory.handshake_timeout_secs)
    }

    pub fn player_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_bind(&self.server.bind, self.server.port)
    }

    pub fn observer_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_bind(&self.server.bind, self.observers.port)
    }
}

fn parse_bind(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let text = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    text.parse().map_err(|_| ConfigError::InvalidAddress(text))
}
