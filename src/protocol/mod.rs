//! Protocol module - Defines the wire protocol shared by the hardware link and the server link
//!
//! The format is fixed and versionless:
//! - 1 byte message type
//! - fixed single-byte fields, multi-byte fields little-endian
//! - serial frames end with a terminator byte, datagrams carry one message each

mod codec;
mod message;

pub use codec::*;
pub use message::*;

use std::time::Duration;

/// UDP port the match server listens on
pub const SERVER_PORT: u16 = 9878;

/// UDP port the handheld listens on for server traffic
pub const LISTENING_PORT: u16 = 1234;

/// Byte that ends every serial link frame
pub const FRAME_TERMINATOR: u8 = 125;

/// Every gun and vest frame is `[type, payload]`
pub const DEVICE_FRAME_LEN: usize = 2;

/// Longest serial frame accepted before the buffer is discarded
pub const MAX_FRAME_LEN: usize = 64;

/// Largest datagram the server sends
pub const MAX_DATAGRAM_SIZE: usize = 512;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const RECONNECT_BACKOFF: Duration = Duration::from_millis(2000);
