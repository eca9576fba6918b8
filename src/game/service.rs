//! Game service
//!
//! The only task that touches the engine. Device events, server events,
//! respawn timers and the one second tick are funnelled into one loop and the
//! resulting effects are carried out in order.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::engine::MatchEngine;
use super::events::Effect;
use crate::link::{LinkEvent, LinkEventKind, SerialLinkHandle};
use crate::network::{DatagramEvent, DatagramHandle};
use crate::presenter::Presenter;

/// Period of the match clock
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct GameService<P: Presenter> {
    engine: MatchEngine,
    presenter: P,
    server: DatagramHandle,
    devices: Vec<SerialLinkHandle>,
    link_rx: mpsc::Receiver<LinkEvent>,
    datagram_rx: mpsc::Receiver<DatagramEvent>,
    respawn_tx: mpsc::Sender<u64>,
    respawn_rx: mpsc::Receiver<u64>,
    tick_period: Duration,
    pending_respawn: Option<JoinHandle<()>>,
}

impl<P: Presenter> GameService<P> {
    pub fn new(
        engine: MatchEngine,
        presenter: P,
        server: DatagramHandle,
        devices: Vec<SerialLinkHandle>,
        link_rx: mpsc::Receiver<LinkEvent>,
        datagram_rx: mpsc::Receiver<DatagramEvent>,
    ) -> Self {
        let (respawn_tx, respawn_rx) = mpsc::channel(8);

        Self {
            engine,
            presenter,
            server,
            devices,
            link_rx,
            datagram_rx,
            respawn_tx,
            respawn_rx,
            tick_period: TICK_PERIOD,
            pending_respawn: None,
        }
    }

    #[cfg(test)]
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Run until `shutdown_rx` fires or its sender is dropped; returns the
    /// engine for inspection
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> MatchEngine {
        let effects = self.engine.recompute_state();
        self.apply(effects);

        let mut ticker = interval_at(Instant::now() + self.tick_period, self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Game service running");

        loop {
            let effects = tokio::select! {
                Some(event) = self.link_rx.recv() => match event.kind {
                    LinkEventKind::Connected => self.engine.on_peer_connected(event.peer),
                    LinkEventKind::Disconnected => self.engine.on_peer_disconnected(event.peer),
                    LinkEventKind::Message(message) => self.engine.on_device_event(message),
                },

                Some(event) = self.datagram_rx.recv() => match event {
                    DatagramEvent::Message(message) => self.engine.on_server_message(message),
                    DatagramEvent::ServerDisconnected => self.engine.on_server_disconnected(),
                },

                Some(generation) = self.respawn_rx.recv() => self.engine.respawn_due(generation),

                _ = ticker.tick() => self.engine.tick(),

                _ = shutdown_rx.recv() => break,
            };
            self.apply(effects);
        }

        if let Some(pending) = self.pending_respawn.take() {
            pending.abort();
        }
        info!("Game service stopped");
        self.engine
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ToServer(message) => self.server.send(message),
                Effect::ToDevices(message) => {
                    for device in &self.devices {
                        device.send(message);
                    }
                }
                Effect::Present(notification) => self.presenter.present(&notification),
                Effect::ScheduleRespawn { delay, generation } => {
                    self.schedule_respawn(delay, generation)
                }
            }
        }
    }

    /// At most one respawn is pending; a newer one replaces it
    fn schedule_respawn(&mut self, delay: Duration, generation: u64) {
        if let Some(previous) = self.pending_respawn.take() {
            previous.abort();
        }
        debug!(?delay, generation, "Respawn scheduled");
        let tx = self.respawn_tx.clone();
        self.pending_respawn = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(generation).await;
        }));
    }
}
