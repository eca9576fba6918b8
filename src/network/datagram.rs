//! Datagram client for the match server

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::DatagramConfig;
use crate::config::Settings;
use crate::protocol::{ClientMessage, ServerMessage, MAX_DATAGRAM_SIZE, RECONNECT_BACKOFF};

/// Datagram client errors
#[derive(Error, Debug)]
pub enum DatagramError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Already running")]
    AlreadyRunning,
}

pub type DatagramResult<T> = Result<T, DatagramError>;

/// Events emitted by the datagram client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramEvent {
    /// A decoded server message
    Message(ServerMessage),
    /// No traffic from the server for longer than the heartbeat timeout
    ServerDisconnected,
}

/// Server liveness, starts offline
#[derive(Debug, Clone)]
pub struct Liveness {
    timeout: Duration,
    last_contact: Option<Instant>,
    online: bool,
}

impl Liveness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_contact: None,
            online: false,
        }
    }

    pub fn record_contact(&mut self, now: Instant) {
        self.last_contact = Some(now);
        self.online = true;
    }

    /// Returns true exactly once per online to offline transition
    pub fn check(&mut self, now: Instant) -> bool {
        let expired = self
            .last_contact
            .map(|at| now.saturating_duration_since(at) > self.timeout)
            .unwrap_or(false);
        if self.online && expired {
            self.online = false;
            return true;
        }
        false
    }

    #[cfg(test)]
    pub fn is_online(&self) -> bool {
        self.online
    }
}

/// A handle for sending messages to the server
#[derive(Clone, Debug)]
pub struct DatagramHandle {
    sender: mpsc::Sender<ClientMessage>,
}

impl DatagramHandle {
    pub fn new(sender: mpsc::Sender<ClientMessage>) -> Self {
        Self { sender }
    }

    /// Queue a message for the server without waiting
    pub fn send(&self, message: ClientMessage) {
        if let Err(e) = self.sender.try_send(message) {
            warn!("Server message dropped: {}", e);
        }
    }
}

/// UDP client: heartbeats out, server messages in
pub struct DatagramClient {
    config: DatagramConfig,
    settings: Settings,
    liveness: Arc<Mutex<Liveness>>,
    event_tx: mpsc::Sender<DatagramEvent>,
    event_rx: Option<mpsc::Receiver<DatagramEvent>>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: Option<mpsc::Receiver<ClientMessage>>,
    listen_addr: Option<SocketAddr>,
    shutdown_tx: Vec<mpsc::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DatagramClient {
    pub fn new(config: DatagramConfig, settings: Settings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);

        Self {
            liveness: Arc::new(Mutex::new(Liveness::new(config.heartbeat_timeout))),
            config,
            settings,
            event_tx,
            event_rx: Some(event_rx),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            listen_addr: None,
            shutdown_tx: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<DatagramEvent>> {
        self.event_rx.take()
    }

    pub fn handle(&self) -> DatagramHandle {
        DatagramHandle::new(self.outbound_tx.clone())
    }

    /// Address the receive socket is bound to, once started
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    #[cfg(test)]
    pub async fn is_online(&self) -> bool {
        self.liveness.lock().await.is_online()
    }

    /// Bind both sockets and spawn the heartbeat and receive tasks
    pub async fn start(&mut self) -> DatagramResult<()> {
        if self.outbound_rx.is_none() {
            return Err(DatagramError::AlreadyRunning);
        }

        let send_socket = UdpSocket::bind(SocketAddr::new(self.config.bind_address, 0)).await?;
        send_socket.set_broadcast(true)?;
        let listen_socket =
            UdpSocket::bind(SocketAddr::new(self.config.bind_address, self.config.listen_port))
                .await?;
        let listen_addr = listen_socket.local_addr()?;
        self.listen_addr = Some(listen_addr);

        let Some(outbound_rx) = self.outbound_rx.take() else {
            return Err(DatagramError::AlreadyRunning);
        };

        let (sender_shutdown_tx, sender_shutdown_rx) = mpsc::channel::<()>(1);
        let (receiver_shutdown_tx, receiver_shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = vec![sender_shutdown_tx, receiver_shutdown_tx];

        let sender = SenderTask {
            config: self.config.clone(),
            settings: self.settings.clone(),
            socket: send_socket,
            liveness: self.liveness.clone(),
            event_tx: self.event_tx.clone(),
            outbound_rx,
            shutdown_rx: sender_shutdown_rx,
        };
        let receiver = ReceiverTask {
            settings: self.settings.clone(),
            listen_addr,
            liveness: self.liveness.clone(),
            event_tx: self.event_tx.clone(),
            shutdown_rx: receiver_shutdown_rx,
        };
        self.tasks.push(tokio::spawn(sender.run()));
        self.tasks.push(tokio::spawn(receiver.run(listen_socket)));

        info!(
            "Datagram client listening on {}, server port {}",
            listen_addr, self.config.server_port
        );
        Ok(())
    }

    /// Stop both tasks and release the sockets. Idempotent.
    pub async fn stop(&mut self) {
        self.shutdown_tx.clear();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

struct SenderTask {
    config: DatagramConfig,
    settings: Settings,
    socket: UdpSocket,
    liveness: Arc<Mutex<Liveness>>,
    event_tx: mpsc::Sender<DatagramEvent>,
    outbound_rx: mpsc::Receiver<ClientMessage>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SenderTask {
    async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        let mut first_contact = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let lost = self.liveness.lock().await.check(Instant::now());
                    if lost {
                        warn!("No traffic from the match server for {:?}", self.config.heartbeat_timeout);
                        if self.event_tx.send(DatagramEvent::ServerDisconnected).await.is_err() {
                            break;
                        }
                    }

                    let message = ClientMessage::Heartbeat {
                        player_id: self.settings.player_id,
                        first_contact,
                    };
                    if self.send(&message).await {
                        first_contact = false;
                    }
                }

                Some(message) = self.outbound_rx.recv() => {
                    self.send(&message).await;
                }

                _ = self.shutdown_rx.recv() => break,
            }
        }

        debug!("Datagram sender stopped");
    }

    async fn target(&self) -> SocketAddr {
        let ip = self
            .settings
            .server_address
            .get()
            .await
            .unwrap_or(self.config.broadcast_address);
        SocketAddr::new(ip, self.config.server_port)
    }

    async fn send(&self, message: &ClientMessage) -> bool {
        let mut buf = BytesMut::with_capacity(8);
        message.encode(&mut buf);
        let target = self.target().await;
        match self.socket.send_to(&buf, target).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Send to {} failed: {}", target, e);
                false
            }
        }
    }
}

struct ReceiverTask {
    settings: Settings,
    listen_addr: SocketAddr,
    liveness: Arc<Mutex<Liveness>>,
    event_tx: mpsc::Sender<DatagramEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReceiverTask {
    async fn run(mut self, socket: UdpSocket) {
        let mut socket = Some(socket);
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let Some(current) = socket.as_ref() else {
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    _ = self.shutdown_rx.recv() => break,
                }
                match UdpSocket::bind(self.listen_addr).await {
                    Ok(rebound) => {
                        info!("Rebound receive socket on {}", self.listen_addr);
                        socket = Some(rebound);
                    }
                    Err(e) => warn!("Rebinding {} failed: {}", self.listen_addr, e),
                }
                continue;
            };

            tokio::select! {
                result = current.recv_from(&mut buf) => match result {
                    Ok((n, from)) => {
                        if !self.handle_packet(&buf[..n], from).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Receive failed: {}", e);
                        socket = None;
                    }
                },

                _ = self.shutdown_rx.recv() => break,
            }
        }

        debug!("Datagram receiver stopped");
    }

    /// Returns false once nobody listens for events
    async fn handle_packet(&self, packet: &[u8], from: SocketAddr) -> bool {
        if self.settings.server_address.discover(from.ip()).await {
            info!("Match server discovered at {}", from.ip());
        }
        self.liveness.lock().await.record_contact(Instant::now());

        match ServerMessage::decode(packet) {
            Ok(message) => {
                debug!(?message, %from, "Server message");
                self.event_tx
                    .send(DatagramEvent::Message(message))
                    .await
                    .is_ok()
            }
            Err(e) => {
                warn!(%from, len = packet.len(), "Dropping datagram: {}", e);
                true
            }
        }
    }
}
