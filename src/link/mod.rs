//! Link module - Point-to-point byte stream links to the gun and the vest
//!
//! Provides:
//! - Connectors that find and open a peer (serial port or TCP bridge)
//! - A reconnecting client per peer that frames, decodes and answers pings

mod client;
mod connector;

pub use client::*;
pub use connector::*;

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::DevicesConfig;
use crate::protocol::{DeviceMessage, RECONNECT_BACKOFF};

/// One of the two wearable devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Peer {
    Gun,
    Vest,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Gun => write!(f, "gun"),
            Peer::Vest => write!(f, "vest"),
        }
    }
}

/// Configuration for a link client
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Delay before a failed or dropped link is retried
    pub reconnect_backoff: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: RECONNECT_BACKOFF,
        }
    }
}

impl From<&DevicesConfig> for LinkConfig {
    fn from(config: &DevicesConfig) -> Self {
        Self {
            reconnect_backoff: config.reconnect_backoff(),
        }
    }
}

/// Event emitted by a link client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub peer: Peer,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEventKind {
    Connected,
    Disconnected,
    /// A decoded frame other than a ping
    Message(DeviceMessage),
}

/// Link client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}
