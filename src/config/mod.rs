//! Configuration module
//!
//! Handles loading and saving the handheld configuration.

mod settings;

pub use settings::*;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{
    HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT, LISTENING_PORT, RECONNECT_BACKOFF, SERVER_PORT,
};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid device spec '{0}' (expected serial:NAME or tcp:HOST:PORT)")]
    InvalidDevice(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local player settings
    #[serde(default)]
    pub player: PlayerConfig,

    /// Match server link settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Gun and vest links
    #[serde(default)]
    pub devices: DevicesConfig,
}

/// Local player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player id assigned by the match organiser
    #[serde(default = "default_player_id")]
    pub id: u8,
    /// Display name until the server sends one
    #[serde(default = "default_player_name")]
    pub name: String,
    #[serde(default = "default_max_health")]
    pub max_health: u8,
    #[serde(default = "default_max_bullets")]
    pub max_bullets: u8,
}

fn default_player_id() -> u8 {
    1
}

fn default_player_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "player".to_string())
}

fn default_max_health() -> u8 {
    100
}

fn default_max_bullets() -> u8 {
    10
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            id: default_player_id(),
            name: default_player_name(),
            max_health: default_max_health(),
            max_bullets: default_max_bullets(),
        }
    }
}

/// Match server link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Last known server address; broadcast is used while unset
    pub address: Option<IpAddr>,
    /// Address heartbeats go to before the server is discovered
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: IpAddr,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,
}

fn default_broadcast_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::BROADCAST)
}

fn default_server_port() -> u16 {
    SERVER_PORT
}

fn default_listen_port() -> u16 {
    LISTENING_PORT
}

fn default_heartbeat_interval() -> u64 {
    HEARTBEAT_INTERVAL.as_millis() as u64
}

fn default_heartbeat_timeout() -> u64 {
    HEARTBEAT_TIMEOUT.as_millis() as u64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: None,
            broadcast_address: default_broadcast_address(),
            server_port: default_server_port(),
            listen_port: default_listen_port(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// How to reach one hardware peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeviceConfig {
    /// Serial port found by name (port path or USB product string)
    Serial {
        name: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Byte stream over TCP, e.g. a ser2net bridge or a simulator
    Tcp { address: String },
}

fn default_baud_rate() -> u32 {
    115_200
}

impl FromStr for DeviceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("serial", name)) if !name.is_empty() => Ok(DeviceConfig::Serial {
                name: name.to_string(),
                baud_rate: default_baud_rate(),
            }),
            Some(("tcp", address)) if address.contains(':') => Ok(DeviceConfig::Tcp {
                address: address.to_string(),
            }),
            _ => Err(ConfigError::InvalidDevice(s.to_string())),
        }
    }
}

/// Hardware peers configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Delay between reconnect attempts in ms
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_gun")]
    pub gun: DeviceConfig,
    #[serde(default = "default_vest")]
    pub vest: DeviceConfig,
}

fn default_gun() -> DeviceConfig {
    DeviceConfig::Serial {
        name: "LaserTag-Gun".to_string(),
        baud_rate: default_baud_rate(),
    }
}

fn default_vest() -> DeviceConfig {
    DeviceConfig::Serial {
        name: "LaserTag-Vest".to_string(),
        baud_rate: default_baud_rate(),
    }
}

fn default_reconnect_backoff() -> u64 {
    RECONNECT_BACKOFF.as_millis() as u64
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: default_reconnect_backoff(),
            gun: default_gun(),
            vest: default_vest(),
        }
    }
}

impl DevicesConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.heartbeat_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.server.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.heartbeat_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("lasertag/config.toml")),
            Some(PathBuf::from("./lasertag.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        player: PlayerConfig {
            id: 3,
            name: "Red Fox".to_string(),
            ..Default::default()
        },
        server: ServerConfig {
            address: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 95))),
            ..Default::default()
        },
        devices: DevicesConfig {
            vest: DeviceConfig::Tcp {
                address: "192.168.4.20:5000".to_string(),
            },
            ..Default::default()
        },
    };

    Ok(toml::to_string_pretty(&config)?)
}
