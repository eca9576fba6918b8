//! Network module - Handles the UDP link to the match server
//!
//! Provides:
//! - Heartbeats, broadcast until the server is discovered
//! - A receive loop that decodes server datagrams
//! - Liveness tracking that reports a lost server once per outage

mod datagram;

pub use datagram::*;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::protocol::{HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT, LISTENING_PORT, SERVER_PORT};

/// Configuration for the datagram client
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Local address both sockets bind to
    pub bind_address: IpAddr,
    /// Heartbeat target until the server address is known
    pub broadcast_address: IpAddr,
    /// Port the server listens on
    pub server_port: u16,
    /// Port to receive server traffic on
    pub listen_port: u16,
    pub heartbeat_interval: Duration,
    /// Silence after which the server counts as lost
    pub heartbeat_timeout: Duration,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            server_port: SERVER_PORT,
            listen_port: LISTENING_PORT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
        }
    }
}

impl DatagramConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            broadcast_address: config.broadcast_address,
            server_port: config.server_port,
            listen_port: config.listen_port,
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            ..Default::default()
        }
    }
}
