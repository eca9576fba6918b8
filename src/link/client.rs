//! Reconnecting link client for one hardware peer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connector::{Connector, PeerStream};
use super::{LinkConfig, LinkEvent, LinkEventKind, LinkState, Peer};
use crate::protocol::{encode_frame, DeviceMessage, FrameDecoder, HostMessage, DEVICE_FRAME_LEN};

/// Link errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Connection closed")]
    Closed,

    #[error("Connection timeout")]
    Timeout,

    #[error("Already started")]
    AlreadyStarted,
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Queue depth for outbound frames
const OUTBOUND_QUEUE: usize = 32;

/// A handle for sending messages to a peer
#[derive(Clone, Debug)]
pub struct SerialLinkHandle {
    peer: Peer,
    sender: mpsc::Sender<HostMessage>,
    connected: Arc<AtomicBool>,
}

impl SerialLinkHandle {
    pub(crate) fn new(
        peer: Peer,
        sender: mpsc::Sender<HostMessage>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            peer,
            sender,
            connected,
        }
    }

    /// Queue a message; dropped when the peer is not connected or the queue
    /// is full
    pub fn send(&self, message: HostMessage) {
        if !self.is_connected() {
            debug!(peer = %self.peer, ?message, "Not connected, message dropped");
            return;
        }
        if let Err(e) = self.sender.try_send(message) {
            warn!(peer = %self.peer, "Outbound message dropped: {}", e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Keeps one peer connected for as long as it runs
pub struct SerialLinkClient {
    peer: Peer,
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    state: Arc<RwLock<LinkState>>,
    event_tx: mpsc::Sender<LinkEvent>,
    outbound_tx: mpsc::Sender<HostMessage>,
    outbound_rx: Option<mpsc::Receiver<HostMessage>>,
    connected: Arc<AtomicBool>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SerialLinkClient {
    /// Create a client; events of every peer may share one channel
    pub fn new(
        peer: Peer,
        config: LinkConfig,
        connector: Arc<dyn Connector>,
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        Self {
            peer,
            config,
            connector,
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            event_tx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn handle(&self) -> SerialLinkHandle {
        SerialLinkHandle::new(self.peer, self.outbound_tx.clone(), self.connected.clone())
    }

    #[cfg(test)]
    pub async fn state(&self) -> LinkState {
        *self.state.read().await
    }

    /// Spawn the connect/read loop; a client runs at most once
    pub fn start(&mut self) -> LinkResult<()> {
        let outbound_rx = self.outbound_rx.take().ok_or(LinkError::AlreadyStarted)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        info!(peer = %self.peer, target = %self.connector.describe(), "Starting link");

        let task = LinkTask {
            peer: self.peer,
            config: self.config.clone(),
            connector: self.connector.clone(),
            state: self.state.clone(),
            event_tx: self.event_tx.clone(),
            outbound_rx,
            connected: self.connected.clone(),
            shutdown_rx,
        };
        self.task = Some(tokio::spawn(task.run()));
        Ok(())
    }

    /// Stop the loop and wait for it to release the connection. Idempotent.
    pub async fn stop(&mut self) {
        self.shutdown_tx.take();
        if let Some(task) = self.task.take() {
            let _ = task.await;
            info!(peer = %self.peer, "Link stopped");
        }
    }
}

/// How a session ended
enum SessionEnd {
    Shutdown,
    Failed(LinkError),
}

struct LinkTask {
    peer: Peer,
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    state: Arc<RwLock<LinkState>>,
    event_tx: mpsc::Sender<LinkEvent>,
    outbound_rx: mpsc::Receiver<HostMessage>,
    connected: Arc<AtomicBool>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl LinkTask {
    async fn set_state(&self, state: LinkState) {
        *self.state.write().await = state;
    }

    async fn emit(&self, kind: LinkEventKind) -> bool {
        self.event_tx
            .send(LinkEvent {
                peer: self.peer,
                kind,
            })
            .await
            .is_ok()
    }

    async fn run(mut self) {
        loop {
            self.set_state(LinkState::Connecting).await;

            let connected = tokio::select! {
                result = self.connector.connect() => result,
                _ = self.shutdown_rx.recv() => break,
            };

            match connected {
                Ok(stream) => {
                    info!(peer = %self.peer, "Link connected");
                    self.connected.store(true, Ordering::SeqCst);
                    self.set_state(LinkState::Connected).await;

                    let end = if self.emit(LinkEventKind::Connected).await {
                        self.session(stream).await
                    } else {
                        SessionEnd::Shutdown
                    };

                    self.connected.store(false, Ordering::SeqCst);
                    self.set_state(LinkState::Disconnected).await;
                    let mut discarded = 0;
                    while self.outbound_rx.try_recv().is_ok() {
                        discarded += 1;
                    }
                    if discarded > 0 {
                        debug!(peer = %self.peer, discarded, "Cleared queued messages");
                    }

                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Failed(e) => {
                            warn!(peer = %self.peer, "Link lost: {}", e);
                            if !self.emit(LinkEventKind::Disconnected).await {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(peer = %self.peer, "Connect failed: {}", e);
                    self.set_state(LinkState::Disconnected).await;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        self.set_state(LinkState::Disconnected).await;
    }

    async fn session(&mut self, stream: Box<dyn PeerStream>) -> SessionEnd {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 64];

        loop {
            tokio::select! {
                result = reader.read(&mut buf) => {
                    let n = match result {
                        Ok(0) => return SessionEnd::Failed(LinkError::Closed),
                        Ok(n) => n,
                        Err(e) => return SessionEnd::Failed(e.into()),
                    };
                    decoder.extend(&buf[..n]);
                    if let Some(end) = self.drain_frames(&mut decoder, &mut writer).await {
                        return end;
                    }
                }

                Some(message) = self.outbound_rx.recv() => {
                    if let Err(e) = write_frame(&mut writer, &message).await {
                        return SessionEnd::Failed(e);
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    let _ = writer.shutdown().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Handle every complete frame in the decoder
    async fn drain_frames<W: AsyncWrite + Unpin>(
        &self,
        decoder: &mut FrameDecoder,
        writer: &mut W,
    ) -> Option<SessionEnd> {
        loop {
            let frame = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return None,
                Err(dropped) => {
                    warn!(peer = %self.peer, dropped, "Unterminated frame discarded");
                    continue;
                }
            };

            if frame.len() != DEVICE_FRAME_LEN {
                warn!(peer = %self.peer, frame = ?&frame[..], "Dropping frame of wrong length");
                continue;
            }

            match DeviceMessage::decode(&frame) {
                Ok(DeviceMessage::Ping) => {
                    if let Err(e) = write_frame(writer, &HostMessage::Ping).await {
                        return Some(SessionEnd::Failed(e));
                    }
                }
                Ok(message) => {
                    debug!(peer = %self.peer, ?message, "Device message");
                    if !self.emit(LinkEventKind::Message(message)).await {
                        return Some(SessionEnd::Shutdown);
                    }
                }
                Err(e) => {
                    warn!(peer = %self.peer, frame = ?&frame[..], "Dropping frame: {}", e);
                }
            }
        }
    }
}

/// One write and flush per message
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &HostMessage) -> LinkResult<()> {
    let frame = encode_frame(message);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::Mutex;
    use tokio::time::timeout;

    /// Hands out prepared streams, then fails
    struct ScriptedConnector {
        streams: Mutex<VecDeque<Box<dyn PeerStream>>>,
    }

    impl ScriptedConnector {
        fn new(streams: Vec<Box<dyn PeerStream>>) -> Arc<Self> {
            Arc::new(Self {
                streams: Mutex::new(streams.into()),
            })
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn connect(&self) -> LinkResult<Box<dyn PeerStream>> {
            self.streams
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| LinkError::PeerNotFound("scripted".to_string()))
        }
    }

    async fn read_exact_frame(device: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        device.read_exact(&mut buf).await.unwrap();
        buf
    }

    fn fast() -> LinkConfig {
        LinkConfig {
            reconnect_backoff: Duration::from_millis(20),
        }
    }

    fn pipe() -> (Box<dyn PeerStream>, DuplexStream) {
        let (local, device) = tokio::io::duplex(256);
        (Box::new(local), device)
    }

    async fn next_event(rx: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for link event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_device_frame_forwarded() {
        let (stream, mut device) = pipe();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client =
            SerialLinkClient::new(Peer::Vest, fast(), ScriptedConnector::new(vec![stream]), event_tx);
        client.start().unwrap();

        assert_eq!(next_event(&mut event_rx).await.kind, LinkEventKind::Connected);
        assert_eq!(client.state().await, LinkState::Connected);

        // GotHit from player 3, split across two reads
        device.write_all(&[5]).await.unwrap();
        device.write_all(&[3, 125]).await.unwrap();

        let event = next_event(&mut event_rx).await;
        assert_eq!(event.peer, Peer::Vest);
        assert_eq!(
            event.kind,
            LinkEventKind::Message(DeviceMessage::GotHit { attacker_id: 3 })
        );

        client.stop().await;
        assert_eq!(client.state().await, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_ping_answered_not_forwarded() {
        let (stream, mut device) = pipe();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client =
            SerialLinkClient::new(Peer::Gun, fast(), ScriptedConnector::new(vec![stream]), event_tx);
        client.start().unwrap();
        next_event(&mut event_rx).await;

        device.write_all(&[1, 0, 125, 2, 0, 125]).await.unwrap();
        assert_eq!(read_exact_frame(&mut device, 2).await, vec![1, 125]);

        // the gun shot is the first thing forwarded
        assert_eq!(
            next_event(&mut event_rx).await.kind,
            LinkEventKind::Message(DeviceMessage::GunShot)
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn test_ping_reply_with_mock_stream() {
        let mock = tokio_test::io::Builder::new()
            .read(&[1, 0, 125])
            .write(&[1, 125])
            .build();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client = SerialLinkClient::new(
            Peer::Gun,
            fast(),
            ScriptedConnector::new(vec![Box::new(mock)]),
            event_tx,
        );
        client.start().unwrap();

        assert_eq!(next_event(&mut event_rx).await.kind, LinkEventKind::Connected);
        // end of script reads as end of stream
        assert_eq!(
            next_event(&mut event_rx).await.kind,
            LinkEventKind::Disconnected
        );
        client.stop().await;
    }

    #[tokio::test]
    async fn test_send_only_while_connected() {
        let (stream, mut device) = pipe();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client =
            SerialLinkClient::new(Peer::Gun, fast(), ScriptedConnector::new(vec![stream]), event_tx);
        let handle = client.handle();
        let state = HostMessage::DeviceState {
            player_id: 4,
            team_id: 1,
            state: 1,
            bullets_left: 9,
        };

        // dropped: not connected yet
        handle.send(HostMessage::Ping);
        assert!(!handle.is_connected());

        client.start().unwrap();
        next_event(&mut event_rx).await;
        assert!(handle.is_connected());

        handle.send(state);
        assert_eq!(
            read_exact_frame(&mut device, 6).await,
            vec![13, 4, 1, 1, 9, 125]
        );

        client.stop().await;
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_after_drop() {
        let (first, device) = pipe();
        let (second, mut second_device) = pipe();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client = SerialLinkClient::new(
            Peer::Vest,
            fast(),
            ScriptedConnector::new(vec![first, second]),
            event_tx,
        );
        client.start().unwrap();

        assert_eq!(next_event(&mut event_rx).await.kind, LinkEventKind::Connected);
        drop(device);
        assert_eq!(
            next_event(&mut event_rx).await.kind,
            LinkEventKind::Disconnected
        );
        assert_eq!(next_event(&mut event_rx).await.kind, LinkEventKind::Connected);

        second_device.write_all(&[3, 0, 125]).await.unwrap();
        assert_eq!(
            next_event(&mut event_rx).await.kind,
            LinkEventKind::Message(DeviceMessage::GunReload)
        );
        client.stop().await;
    }

    #[tokio::test]
    async fn test_garbage_does_not_drop_link() {
        let (stream, mut device) = pipe();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client =
            SerialLinkClient::new(Peer::Gun, fast(), ScriptedConnector::new(vec![stream]), event_tx);
        client.start().unwrap();
        next_event(&mut event_rx).await;

        // unknown type, then a runaway frame, then a valid one
        device.write_all(&[99, 0, 125]).await.unwrap();
        device.write_all(&[7u8; 80]).await.unwrap();
        device.write_all(&[125, 2, 0, 125]).await.unwrap();

        assert_eq!(
            next_event(&mut event_rx).await.kind,
            LinkEventKind::Message(DeviceMessage::GunShot)
        );
        assert_eq!(client.state().await, LinkState::Connected);
        client.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice() {
        let (event_tx, _event_rx) = mpsc::channel(16);
        let mut client =
            SerialLinkClient::new(Peer::Gun, fast(), ScriptedConnector::new(vec![]), event_tx);
        client.start().unwrap();
        assert!(matches!(client.start(), Err(LinkError::AlreadyStarted)));

        client.stop().await;
        client.stop().await;
        assert_eq!(client.state().await, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_frames_of_wrong_length_dropped() {
        let (stream, mut device) = pipe();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let mut client =
            SerialLinkClient::new(Peer::Vest, fast(), ScriptedConnector::new(vec![stream]), event_tx);
        client.start().unwrap();
        next_event(&mut event_rx).await;

        // a bare gun shot byte and a hit with a trailing byte are both rejected
        device.write_all(&[2, 125, 5, 3, 9, 125]).await.unwrap();
        device.write_all(&[5, 4, 125]).await.unwrap();

        assert_eq!(
            next_event(&mut event_rx).await.kind,
            LinkEventKind::Message(DeviceMessage::GotHit { attacker_id: 4 })
        );
        assert_eq!(client.state().await, LinkState::Connected);
        client.stop().await;
    }
}
