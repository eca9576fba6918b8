//! Finding and opening hardware peers

use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::client::{LinkError, LinkResult};
use crate::config::DeviceConfig;

/// Blocking read timeout of an open serial port
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Buffer size of the async side of a serial bridge
const BRIDGE_BUFFER: usize = 1024;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected byte stream to a peer
pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> PeerStream for T {}

/// Opens a stream to one peer; called again after every failure
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human readable target for logs
    fn describe(&self) -> String;

    async fn connect(&self) -> LinkResult<Box<dyn PeerStream>>;
}

/// Build the connector for a configured device
pub fn connector_for(config: &DeviceConfig) -> Arc<dyn Connector> {
    match config {
        DeviceConfig::Serial { name, baud_rate } => {
            Arc::new(SerialConnector::new(name.clone(), *baud_rate))
        }
        DeviceConfig::Tcp { address } => Arc::new(TcpConnector::new(address.clone())),
    }
}

/// Byte stream over TCP (ser2net, Wi-Fi bridges, simulators)
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }

    async fn connect(&self) -> LinkResult<Box<dyn PeerStream>> {
        let stream = tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(&self.address))
            .await
            .map_err(|_| LinkError::Timeout)??;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Serial port found by name
///
/// The name may be a port path (`/dev/rfcomm0`, `COM4`), the tail of one, or
/// the product string or serial number of a USB adapter. The resolved path is
/// cached until opening it fails.
pub struct SerialConnector {
    name: String,
    baud_rate: u32,
    resolved: Mutex<Option<String>>,
}

impl SerialConnector {
    pub fn new(name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            name: name.into(),
            baud_rate,
            resolved: Mutex::new(None),
        }
    }

    async fn resolve(&self) -> LinkResult<String> {
        let mut resolved = self.resolved.lock().await;
        if let Some(path) = resolved.as_ref() {
            return Ok(path.clone());
        }

        let ports = serialport::available_ports()?;
        let path = find_port(&ports, &self.name)
            .or_else(|| Path::new(&self.name).exists().then(|| self.name.clone()))
            .ok_or_else(|| LinkError::PeerNotFound(self.name.clone()))?;

        info!("Found {} at {}", self.name, path);
        *resolved = Some(path.clone());
        Ok(path)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    fn describe(&self) -> String {
        format!("serial://{}@{}", self.name, self.baud_rate)
    }

    async fn connect(&self) -> LinkResult<Box<dyn PeerStream>> {
        let path = self.resolve().await?;
        let baud_rate = self.baud_rate;

        let open_path = path.clone();
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(&open_path, baud_rate)
                .timeout(SERIAL_READ_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| LinkError::Io(std::io::Error::other(e)))?;

        let port = match opened {
            Ok(port) => port,
            Err(e) => {
                debug!("Forgetting {} after open failure", path);
                *self.resolved.lock().await = None;
                return Err(e.into());
            }
        };

        let writer = port.try_clone()?;
        debug!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(Box::new(bridge(port, writer)))
    }
}

/// Match a configured name against the visible ports
fn find_port(ports: &[SerialPortInfo], name: &str) -> Option<String> {
    ports
        .iter()
        .find(|info| {
            let file_name = Path::new(&info.port_name).file_name();
            if info.port_name == name || file_name == Some(OsStr::new(name)) {
                return true;
            }
            match &info.port_type {
                SerialPortType::UsbPort(usb) => {
                    usb.product.as_deref() == Some(name)
                        || usb.serial_number.as_deref() == Some(name)
                }
                _ => false,
            }
        })
        .map(|info| info.port_name.clone())
}

/// Bridge a blocking serial port to an async stream
///
/// Two threads shuttle bytes between the port and one end of an in-memory
/// duplex pipe; the other end is returned. Dropping it stops both threads and
/// closes the port; a port error shows up as end of stream.
fn bridge(
    mut reader: Box<dyn serialport::SerialPort>,
    mut writer: Box<dyn serialport::SerialPort>,
) -> tokio::io::DuplexStream {
    let (local, remote) = tokio::io::duplex(BRIDGE_BUFFER);
    let (mut remote_rx, mut remote_tx) = tokio::io::split(remote);
    let closed = Arc::new(AtomicBool::new(false));
    let handle = Handle::current();

    let read_closed = closed.clone();
    let read_handle = handle.clone();
    std::thread::spawn(move || {
        let mut buf = [0u8; 256];
        while !read_closed.load(Ordering::SeqCst) {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    debug!("Serial read failed: {}", e);
                    break;
                }
            };
            if read_handle.block_on(remote_tx.write_all(&buf[..n])).is_err() {
                break;
            }
        }
        read_closed.store(true, Ordering::SeqCst);
        let _ = read_handle.block_on(remote_tx.shutdown());
    });

    std::thread::spawn(move || {
        let mut buf = [0u8; 256];
        loop {
            let n = match handle.block_on(remote_rx.read(&mut buf)) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
                debug!("Serial write failed: {}", e);
                break;
            }
        }
        closed.store(true, Ordering::SeqCst);
    });

    local
}

/// Ports visible for discovery, with a description for display
pub fn list_ports() -> LinkResult<Vec<(String, String)>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let description = match info.port_type {
                SerialPortType::UsbPort(usb) => format!(
                    "usb {:04x}:{:04x} {} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default(),
                    usb.serial_number.unwrap_or_default()
                ),
                SerialPortType::BluetoothPort => "bluetooth".to_string(),
                SerialPortType::PciPort => "pci".to_string(),
                SerialPortType::Unknown => "unknown".to_string(),
            };
            (info.port_name, description.trim_end().to_string())
        })
        .collect())
}
