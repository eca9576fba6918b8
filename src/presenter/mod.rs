//! Presenter module - Where notifications from the engine end up
//!
//! The handheld UI is out of scope; these sinks make the core observable from
//! a terminal or a log.

use std::io::{self, Write};
use tracing::{info, warn};

use crate::game::{GameEvent, Notification};
use crate::protocol::ServerMessage;

/// Receives every notification, in order, from the game service
pub trait Presenter: Send {
    fn present(&mut self, notification: &Notification);
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn present(&mut self, notification: &Notification) {
        (**self).present(notification)
    }
}

/// Structured log lines only
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn present(&mut self, notification: &Notification) {
        match notification {
            Notification::StateChanged { view } => info!(
                state = ?view.state,
                health = view.player.health,
                bullets = view.player.bullets_left,
                score = view.player.score,
                team = view.player.team_id,
                "State"
            ),
            Notification::Event { event, player } => info!(
                code = event.type_id(),
                event = %describe(event),
                health = player.health,
                bullets = player.bullets_left,
                score = player.score,
                "Event"
            ),
            Notification::Roster { players } => {
                for (rank, p) in players.iter().enumerate() {
                    info!(
                        rank = rank + 1,
                        id = p.id,
                        name = %p.name,
                        score = p.score,
                        health = p.health,
                        team = p.team_id,
                        "Roster"
                    );
                }
            }
            Notification::Time { minutes, seconds } => {
                tracing::debug!("Time {:02}:{:02}", minutes, seconds)
            }
        }
    }
}

/// Human readable or JSON lines on a writer
pub struct ConsolePresenter<W: Write + Send> {
    writer: W,
    json: bool,
}

impl ConsolePresenter<io::Stdout> {
    pub fn stdout(json: bool) -> Self {
        Self::new(io::stdout(), json)
    }
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(writer: W, json: bool) -> Self {
        Self { writer, json }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_human(&mut self, notification: &Notification) -> io::Result<()> {
        match notification {
            Notification::StateChanged { view } => writeln!(
                self.writer,
                "[{}] health {}/{} bullets {}/{} score {}{}",
                format!("{:?}", view.state).to_uppercase(),
                view.player.health,
                view.player.max_health,
                view.player.bullets_left,
                view.player.max_bullets,
                view.player.score,
                if view.team_play {
                    format!(" team {}", view.player.team_id)
                } else {
                    String::new()
                }
            ),
            Notification::Event { event, player } => writeln!(
                self.writer,
                "{} (health {}, bullets {}, score {})",
                describe(event),
                player.health,
                player.bullets_left,
                player.score
            ),
            Notification::Roster { players } => {
                writeln!(self.writer, "--- roster ---")?;
                for (rank, p) in players.iter().enumerate() {
                    writeln!(
                        self.writer,
                        "{:>2}. {:<16} #{:<3} score {:>3} health {:>3} team {}",
                        rank + 1,
                        p.name,
                        p.id,
                        p.score,
                        p.health,
                        p.team_id
                    )?;
                }
                Ok(())
            }
            Notification::Time { minutes, seconds } => {
                writeln!(self.writer, "{:02}:{:02}", minutes, seconds)
            }
        }
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn present(&mut self, notification: &Notification) {
        let result = if self.json {
            serde_json::to_string(notification)
                .map_err(io::Error::from)
                .and_then(|line| writeln!(self.writer, "{}", line))
        } else {
            self.write_human(notification)
        };

        if let Err(e) = result.and_then(|_| self.writer.flush()) {
            warn!("Console output failed: {}", e);
        }
    }
}

/// One-line description of an event
pub fn describe(event: &GameEvent) -> String {
    match event {
        GameEvent::GunShot => "shot fired".to_string(),
        GameEvent::NoBullets => "no bullets".to_string(),
        GameEvent::Reload => "reloaded".to_string(),
        GameEvent::GotHit { attacker_id } => format!("hit by #{}", attacker_id),
        GameEvent::YouKilled { killer_id } => format!("killed by #{}", killer_id),
        GameEvent::Respawn => "respawned".to_string(),
        GameEvent::DeviceConnected { peer } => format!("{} connected", peer),
        GameEvent::DeviceDisconnected { peer } => format!("{} disconnected", peer),
        GameEvent::ServerDisconnected => "server lost".to_string(),
        GameEvent::Server { message } => match message {
            ServerMessage::Ping => "server ping".to_string(),
            ServerMessage::GunShot { player_id } => format!("#{} fired", player_id),
            ServerMessage::GunReload { player_id } => format!("#{} reloaded", player_id),
            ServerMessage::YouHitSomeone { victim_id } => format!("you hit #{}", victim_id),
            ServerMessage::GotHit { attacker_id } => format!("hit by #{}", attacker_id),
            ServerMessage::Respawn { player_id } => format!("#{} respawned", player_id),
            ServerMessage::GameOver { winner_id } => format!("game over, winner #{}", winner_id),
            ServerMessage::GameStart(start) => format!(
                "game starts in {}s: {} min{}",
                start.start_delay,
                start.game_minutes,
                if start.team_play { ", teams" } else { "" }
            ),
            ServerMessage::YouKilled { killer_id } => format!("killed by #{}", killer_id),
            ServerMessage::YouScored { victim_id } => format!("you scored on #{}", victim_id),
            ServerMessage::RosterSnapshot(snapshot) => {
                format!("roster update ({} players)", snapshot.players.len())
            }
            ServerMessage::NoBullets { player_id } => format!("#{} is out of bullets", player_id),
            ServerMessage::TimeUpdate { minutes, seconds } => {
                format!("time {:02}:{:02}", minutes, seconds)
            }
        },
    }
}
