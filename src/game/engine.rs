//! Match state engine
//!
//! Owns the local player, the roster and the timers. Every input is a method
//! call that mutates the state and returns the effects the caller has to carry
//! out; the engine itself never touches a socket or a timer.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::events::{AggregateState, Effect, GameEvent, Notification, StateView};
use super::player::{Player, Roster};
use super::timers::{minutes_seconds, MatchTimers};
use crate::config::PlayerConfig;
use crate::link::Peer;
use crate::protocol::{
    ClientMessage, DeviceMessage, EventKind, EventToServer, GameStart, HostMessage,
    RosterSnapshot, ServerMessage,
};

/// Static parameters of the local player
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub player_id: u8,
    pub player_name: String,
    pub max_health: u8,
    pub max_bullets: u8,
}

impl From<&PlayerConfig> for EngineConfig {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            player_id: config.id,
            player_name: config.name.clone(),
            max_health: config.max_health,
            max_bullets: config.max_bullets,
        }
    }
}

/// Single owner of all match state
#[derive(Debug)]
pub struct MatchEngine {
    player: Player,
    roster: Roster,
    timers: MatchTimers,
    max_health: u8,
    max_bullets: u8,
    server_online: bool,
    game_running: bool,
    start_pending: bool,
    team_play: bool,
    respawn_timeout: u8,
    /// Bumped whenever scheduled respawns become obsolete
    respawn_generation: u64,
    published_state: Option<AggregateState>,
}

impl MatchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            player: Player::new(
                config.player_id,
                config.player_name,
                config.max_health,
                config.max_bullets,
            ),
            roster: Roster::new(),
            timers: MatchTimers::new(),
            max_health: config.max_health,
            max_bullets: config.max_bullets,
            server_online: false,
            game_running: false,
            start_pending: false,
            team_play: false,
            respawn_timeout: 0,
            respawn_generation: 0,
            published_state: None,
        }
    }

    #[cfg(test)]
    pub fn player(&self) -> &Player {
        &self.player
    }

    #[cfg(test)]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    #[cfg(test)]
    pub fn timers(&self) -> &MatchTimers {
        &self.timers
    }

    /// Current aggregate state, derived on every call
    pub fn state(&self) -> AggregateState {
        AggregateState::derive(
            self.server_online,
            self.game_running,
            self.start_pending,
            self.player.is_alive(),
        )
    }

    pub fn view(&self) -> StateView {
        StateView {
            state: self.state(),
            player: self.player.clone(),
            team_play: self.team_play,
            server_online: self.server_online,
            game_running: self.game_running,
            game_timer: self.timers.game(),
            respawn_timer: self.timers.respawn(),
        }
    }

    fn in_match(&self) -> bool {
        self.game_running && !self.start_pending
    }

    fn device_state(&self) -> HostMessage {
        HostMessage::DeviceState {
            player_id: self.player.id,
            team_id: self.player.team_id,
            state: self.state().code(),
            bullets_left: self.player.bullets_left,
        }
    }

    fn report(&self, kind: EventKind, other_id: u8) -> Effect {
        Effect::ToServer(ClientMessage::Event(EventToServer {
            kind,
            player_id: self.player.id,
            other_id,
            health: self.player.health,
            score: self.player.score,
            bullets_left: self.player.bullets_left,
            team_id: self.player.team_id,
        }))
    }

    fn present_event(&self, event: GameEvent) -> Effect {
        Effect::Present(Notification::Event {
            event,
            player: self.player.clone(),
        })
    }

    /// Handle a message from the gun or vest
    pub fn on_device_event(&mut self, message: DeviceMessage) -> Vec<Effect> {
        let (kind, other_id, event) = match message {
            DeviceMessage::Ping => return Vec::new(),
            DeviceMessage::GunShot => {
                if !self.player.shoot() {
                    debug!("Trigger pulled with an empty magazine");
                    let mut effects = vec![self.present_event(GameEvent::NoBullets)];
                    effects.extend(self.recompute_state());
                    return effects;
                }
                (EventKind::GunShot, 0, GameEvent::GunShot)
            }
            DeviceMessage::GunReload => {
                self.player.reload();
                (EventKind::GunReload, 0, GameEvent::Reload)
            }
            DeviceMessage::GotHit { attacker_id } => match self.apply_hit(attacker_id) {
                Some(hit) => hit,
                None => return Vec::new(),
            },
        };

        let mut effects = vec![self.report(kind, other_id), self.present_event(event)];
        if kind == EventKind::YouKilled {
            info!(killer = other_id, "Player killed");
            effects.push(Effect::ScheduleRespawn {
                delay: Duration::from_secs(self.respawn_timeout as u64),
                generation: self.respawn_generation,
            });
        }
        effects.extend(self.recompute_state());
        effects
    }

    /// Apply a vest hit; `None` when the hit must be ignored
    fn apply_hit(&mut self, attacker_id: u8) -> Option<(EventKind, u8, GameEvent)> {
        if !self.in_match() {
            debug!(attacker = attacker_id, "Hit outside a running game ignored");
            return None;
        }
        if !self.player.is_alive() {
            debug!(attacker = attacker_id, "Hit while dead ignored");
            return None;
        }
        let (damage, team_id) = match self.roster.get(attacker_id) {
            Some(attacker) => (attacker.damage, attacker.team_id),
            None => {
                warn!(attacker = attacker_id, "Hit from unknown player dropped");
                return None;
            }
        };
        if team_id != 0 && team_id == self.player.team_id {
            debug!(attacker = attacker_id, team = team_id, "Friendly fire ignored");
            return None;
        }

        self.player.take_damage(damage);
        if self.player.is_alive() {
            Some((EventKind::GotHit, attacker_id, GameEvent::GotHit { attacker_id }))
        } else {
            self.timers.arm_respawn(self.respawn_timeout as u32);
            Some((
                EventKind::YouKilled,
                attacker_id,
                GameEvent::YouKilled {
                    killer_id: attacker_id,
                },
            ))
        }
    }

    /// A hardware peer came up: it has no idea of the game state yet
    pub fn on_peer_connected(&mut self, peer: Peer) -> Vec<Effect> {
        info!(%peer, "Device connected");
        vec![
            Effect::ToDevices(self.device_state()),
            self.present_event(GameEvent::DeviceConnected { peer }),
        ]
    }

    pub fn on_peer_disconnected(&mut self, peer: Peer) -> Vec<Effect> {
        info!(%peer, "Device disconnected");
        vec![self.present_event(GameEvent::DeviceDisconnected { peer })]
    }

    /// Handle a datagram from the match server
    pub fn on_server_message(&mut self, message: ServerMessage) -> Vec<Effect> {
        if !self.server_online {
            info!("Match server online");
        }
        self.server_online = true;

        let mut effects = Vec::new();
        match &message {
            ServerMessage::Ping => {}
            ServerMessage::YouScored { victim_id } => {
                self.player.add_score(1);
                debug!(victim = victim_id, score = self.player.score, "Scored");
            }
            ServerMessage::GameStart(start) => {
                effects.push(self.start_game(start));
            }
            ServerMessage::GameOver { winner_id } => {
                info!(winner = winner_id, "Game over");
                self.game_running = false;
                self.start_pending = false;
                self.respawn_generation += 1;
            }
            ServerMessage::RosterSnapshot(snapshot) => self.apply_snapshot(snapshot),
            ServerMessage::TimeUpdate { minutes, seconds } => {
                effects.push(Effect::Present(Notification::Time {
                    minutes: *minutes,
                    seconds: *seconds,
                }));
            }
            _ => {}
        }

        match &message {
            ServerMessage::Ping | ServerMessage::TimeUpdate { .. } => {}
            ServerMessage::RosterSnapshot(_) => {
                effects.push(self.present_event(GameEvent::Server { message }));
                effects.push(Effect::Present(Notification::Roster {
                    players: self.roster.players().to_vec(),
                }));
            }
            _ => effects.push(self.present_event(GameEvent::Server { message })),
        }

        effects.extend(self.recompute_state());
        effects
    }

    fn start_game(&mut self, start: &GameStart) -> Effect {
        info!(
            team_play = start.team_play,
            minutes = start.game_minutes,
            delay = start.start_delay,
            "Game starting"
        );
        self.team_play = start.team_play;
        self.respawn_timeout = start.respawn_time;
        self.timers
            .arm_game(start.game_minutes as u32 * 60 + start.start_delay as u32);
        self.timers.arm_respawn(start.start_delay as u32);
        self.start_pending = true;
        self.respawn_generation += 1;
        Effect::ScheduleRespawn {
            delay: Duration::from_secs(start.start_delay as u64),
            generation: self.respawn_generation,
        }
    }

    fn apply_snapshot(&mut self, snapshot: &RosterSnapshot) {
        self.game_running = snapshot.game_running;
        self.team_play = snapshot.team_play;
        self.timers.arm_game(snapshot.game_timer_seconds.max(0) as u32);
        self.roster
            .merge(&snapshot.players, self.max_health, self.max_bullets);
        if let Some(me) = self.roster.get(self.player.id) {
            self.player.sync_from(me);
        }
        debug!(players = self.roster.len(), "Roster updated");
    }

    pub fn on_server_disconnected(&mut self) -> Vec<Effect> {
        warn!("Match server lost");
        self.server_online = false;
        let mut effects = vec![self.present_event(GameEvent::ServerDisconnected)];
        effects.extend(self.recompute_state());
        effects
    }

    /// A respawn timer fired; ignored if it was scheduled before the last
    /// game start or game over
    pub fn respawn_due(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.respawn_generation {
            debug!(
                generation,
                current = self.respawn_generation,
                "Stale respawn ignored"
            );
            return Vec::new();
        }
        self.respawn()
    }

    pub fn respawn(&mut self) -> Vec<Effect> {
        info!("Respawn");
        self.player.respawn();
        self.game_running = true;
        self.start_pending = false;
        let mut effects = vec![
            self.report(EventKind::Respawn, 0),
            self.present_event(GameEvent::Respawn),
        ];
        effects.extend(self.recompute_state());
        effects
    }

    /// One second elapsed
    pub fn tick(&mut self) -> Vec<Effect> {
        if !(self.game_running || self.start_pending) {
            return Vec::new();
        }
        self.timers.tick();
        let remaining = if self.state() == AggregateState::Game {
            self.timers.game()
        } else {
            self.timers.respawn()
        };
        let (minutes, seconds) = minutes_seconds(remaining);
        vec![Effect::Present(Notification::Time { minutes, seconds })]
    }

    /// Publish the aggregate state if it changed since the last call
    pub fn recompute_state(&mut self) -> Vec<Effect> {
        let state = self.state();
        if self.published_state == Some(state) {
            return Vec::new();
        }
        info!(?state, "State changed");
        self.published_state = Some(state);
        vec![
            Effect::Present(Notification::StateChanged { view: self.view() }),
            Effect::ToDevices(self.device_state()),
        ]
    }
}
