//! Protocol message definitions
//!
//! Every message that crosses either transport, split by direction so each
//! type byte has exactly one payload shape per enum.

use serde::{Deserialize, Serialize};

/// Message type identifiers (first byte of every message)
pub mod message_type {
    pub const PING: u8 = 1;
    pub const GUN_SHOT: u8 = 2;
    pub const GUN_RELOAD: u8 = 3;
    pub const YOU_HIT_SOMEONE: u8 = 4;
    pub const GOT_HIT: u8 = 5;
    pub const RESPAWN: u8 = 6;
    pub const GAME_OVER: u8 = 7;
    pub const GAME_START: u8 = 8;
    pub const YOU_KILLED: u8 = 9;
    pub const YOU_SCORED: u8 = 10;
    pub const ROSTER_SNAPSHOT: u8 = 11;
    pub const NO_BULLETS: u8 = 12;
    pub const DEVICE_STATE: u8 = 13;
    pub const DEVICE_CONNECTED: u8 = 14;
    pub const DEVICE_DISCONNECTED: u8 = 15;
    pub const TIME_UPDATE: u8 = 101;
    pub const SERVER_DISCONNECTED: u8 = 102;
}

/// Messages sent by the gun or vest over the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Keepalive, answered by the link itself
    Ping,
    /// Trigger pulled
    GunShot,
    /// Reload button pressed
    GunReload,
    /// Vest sensor registered a hit
    GotHit { attacker_id: u8 },
}

/// Messages sent from the handheld to the gun or vest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    /// Keepalive reply
    Ping,
    /// Compact player state, the only way hardware learns the game state
    DeviceState {
        player_id: u8,
        team_id: u8,
        state: u8,
        bullets_left: u8,
    },
}

/// Parameters of a new match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStart {
    pub team_play: bool,
    /// Seconds a killed player waits before respawning
    pub respawn_time: u8,
    pub game_minutes: u8,
    /// Countdown before the match begins
    pub start_delay: u8,
}

/// One player row inside a roster snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: u8,
    pub health: u8,
    pub score: u8,
    pub team_id: u8,
    pub damage: u8,
    pub bullets_left: u8,
    pub name: String,
}

/// Full roster as broadcast by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub game_running: bool,
    pub team_play: bool,
    pub game_timer_seconds: i16,
    pub players: Vec<PlayerRecord>,
}

/// Messages received from the match server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ping,
    GunShot { player_id: u8 },
    GunReload { player_id: u8 },
    YouHitSomeone { victim_id: u8 },
    GotHit { attacker_id: u8 },
    Respawn { player_id: u8 },
    GameOver { winner_id: u8 },
    GameStart(GameStart),
    YouKilled { killer_id: u8 },
    YouScored { victim_id: u8 },
    RosterSnapshot(RosterSnapshot),
    NoBullets { player_id: u8 },
    TimeUpdate { minutes: u8, seconds: u8 },
}

impl ServerMessage {
    /// Get the message type identifier
    pub fn type_id(&self) -> u8 {
        match self {
            ServerMessage::Ping => message_type::PING,
            ServerMessage::GunShot { .. } => message_type::GUN_SHOT,
            ServerMessage::GunReload { .. } => message_type::GUN_RELOAD,
            ServerMessage::YouHitSomeone { .. } => message_type::YOU_HIT_SOMEONE,
            ServerMessage::GotHit { .. } => message_type::GOT_HIT,
            ServerMessage::Respawn { .. } => message_type::RESPAWN,
            ServerMessage::GameOver { .. } => message_type::GAME_OVER,
            ServerMessage::GameStart(_) => message_type::GAME_START,
            ServerMessage::YouKilled { .. } => message_type::YOU_KILLED,
            ServerMessage::YouScored { .. } => message_type::YOU_SCORED,
            ServerMessage::RosterSnapshot(_) => message_type::ROSTER_SNAPSHOT,
            ServerMessage::NoBullets { .. } => message_type::NO_BULLETS,
            ServerMessage::TimeUpdate { .. } => message_type::TIME_UPDATE,
        }
    }
}

/// Kind of a game event reported to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    GunShot = message_type::GUN_SHOT,
    GunReload = message_type::GUN_RELOAD,
    YouHitSomeone = message_type::YOU_HIT_SOMEONE,
    GotHit = message_type::GOT_HIT,
    Respawn = message_type::RESPAWN,
    YouKilled = message_type::YOU_KILLED,
    YouScored = message_type::YOU_SCORED,
    NoBullets = message_type::NO_BULLETS,
}

impl EventKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            message_type::GUN_SHOT => Some(EventKind::GunShot),
            message_type::GUN_RELOAD => Some(EventKind::GunReload),
            message_type::YOU_HIT_SOMEONE => Some(EventKind::YouHitSomeone),
            message_type::GOT_HIT => Some(EventKind::GotHit),
            message_type::RESPAWN => Some(EventKind::Respawn),
            message_type::YOU_KILLED => Some(EventKind::YouKilled),
            message_type::YOU_SCORED => Some(EventKind::YouScored),
            message_type::NO_BULLETS => Some(EventKind::NoBullets),
            _ => None,
        }
    }
}

/// A local event mirrored to the server with the player's post-event values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventToServer {
    pub kind: EventKind,
    pub player_id: u8,
    pub other_id: u8,
    pub health: u8,
    pub score: u8,
    pub bullets_left: u8,
    pub team_id: u8,
}

/// Messages sent from the handheld to the match server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Liveness packet; `first_contact` is set only on the very first one
    Heartbeat { player_id: u8, first_contact: bool },
    Event(EventToServer),
}
