//! Values the engine hands to the outside world

use serde::Serialize;
use std::time::Duration;

use super::player::Player;
use crate::link::Peer;
use crate::protocol::message_type as mt;
use crate::protocol::{ClientMessage, HostMessage, ServerMessage};

/// Derived game state driving the UI and the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateState {
    Idle,
    Game,
    Dead,
    Offline,
}

impl AggregateState {
    /// Derive the state from the engine flags
    pub fn derive(server_online: bool, game_running: bool, start_pending: bool, alive: bool) -> Self {
        if !server_online {
            AggregateState::Offline
        } else if !game_running || start_pending {
            AggregateState::Idle
        } else if !alive {
            AggregateState::Dead
        } else {
            AggregateState::Game
        }
    }

    /// Code sent to the hardware
    pub fn code(&self) -> u8 {
        match self {
            AggregateState::Idle => 0,
            AggregateState::Game => 1,
            AggregateState::Dead => 2,
            AggregateState::Offline => 3,
        }
    }
}

/// Read-only snapshot of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateView {
    pub state: AggregateState,
    pub player: Player,
    pub team_play: bool,
    pub server_online: bool,
    pub game_running: bool,
    pub game_timer: u32,
    pub respawn_timer: u32,
}

/// Something that happened, as shown to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    GunShot,
    NoBullets,
    Reload,
    GotHit { attacker_id: u8 },
    YouKilled { killer_id: u8 },
    Respawn,
    DeviceConnected { peer: Peer },
    DeviceDisconnected { peer: Peer },
    ServerDisconnected,
    Server { message: ServerMessage },
}

impl GameEvent {
    /// Message type code of the event
    pub fn type_id(&self) -> u8 {
        match self {
            GameEvent::GunShot => mt::GUN_SHOT,
            GameEvent::NoBullets => mt::NO_BULLETS,
            GameEvent::Reload => mt::GUN_RELOAD,
            GameEvent::GotHit { .. } => mt::GOT_HIT,
            GameEvent::YouKilled { .. } => mt::YOU_KILLED,
            GameEvent::Respawn => mt::RESPAWN,
            GameEvent::DeviceConnected { .. } => mt::DEVICE_CONNECTED,
            GameEvent::DeviceDisconnected { .. } => mt::DEVICE_DISCONNECTED,
            GameEvent::ServerDisconnected => mt::SERVER_DISCONNECTED,
            GameEvent::Server { message } => message.type_id(),
        }
    }
}

/// Notifications for the presenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    StateChanged { view: StateView },
    Event { event: GameEvent, player: Player },
    Roster { players: Vec<Player> },
    Time { minutes: u8, seconds: u8 },
}

/// Instructions returned by the engine for the service to carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ToServer(ClientMessage),
    ToDevices(HostMessage),
    Present(Notification),
    /// Call `respawn_due(generation)` after `delay`
    ScheduleRespawn { delay: Duration, generation: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_derivation() {
        use AggregateState::*;
        assert_eq!(AggregateState::derive(false, true, false, true), Offline);
        assert_eq!(AggregateState::derive(true, false, false, true), Idle);
        assert_eq!(AggregateState::derive(true, true, true, false), Idle);
        assert_eq!(AggregateState::derive(true, true, false, false), Dead);
        assert_eq!(AggregateState::derive(true, true, false, true), Game);
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(AggregateState::Idle.code(), 0);
        assert_eq!(AggregateState::Game.code(), 1);
        assert_eq!(AggregateState::Dead.code(), 2);
        assert_eq!(AggregateState::Offline.code(), 3);
    }

    #[test]
    fn test_event_type_ids() {
        assert_eq!(GameEvent::ServerDisconnected.type_id(), 102);
        assert_eq!(GameEvent::DeviceConnected { peer: Peer::Vest }.type_id(), 14);
        let event = GameEvent::Server {
            message: ServerMessage::GameOver { winner_id: 2 },
        };
        assert_eq!(event.type_id(), 7);
    }
}
