//! Runtime settings handed to the transports

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Config;

/// Shared cell holding the match server address
///
/// Unset until the first inbound packet reveals the server, then fixed for
/// the rest of the process.
#[derive(Debug, Clone, Default)]
pub struct ServerAddress {
    inner: Arc<RwLock<Option<IpAddr>>>,
}

impl ServerAddress {
    pub fn new(initial: Option<IpAddr>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get(&self) -> Option<IpAddr> {
        *self.inner.read().await
    }

    /// Record the server address if none is known yet.
    /// Returns true when the address was stored.
    pub async fn discover(&self, addr: IpAddr) -> bool {
        let mut inner = self.inner.write().await;
        if inner.is_some() {
            return false;
        }
        *inner = Some(addr);
        true
    }
}

/// Values the core needs from the outside world
#[derive(Debug, Clone)]
pub struct Settings {
    pub player_id: u8,
    pub server_address: ServerAddress,
}

impl Settings {
    pub fn new(player_id: u8, server_address: ServerAddress) -> Self {
        Self {
            player_id,
            server_address,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.player.id,
            ServerAddress::new(config.server.address),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_server_address_is_fixed_once_discovered() {
        let cell = ServerAddress::default();
        assert_eq!(cell.get().await, None);

        let first = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let second = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6));

        assert!(cell.discover(first).await);
        assert!(!cell.discover(second).await);
        assert_eq!(cell.get().await, Some(first));

        // clones share the same cell
        let clone = cell.clone();
        assert_eq!(clone.get().await, Some(first));
    }

    #[tokio::test]
    async fn test_settings_from_config() {
        let mut config = Config::default();
        config.player.id = 9;
        config.server.address = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let settings = Settings::from_config(&config);
        assert_eq!(settings.player_id, 9);
        assert_eq!(
            settings.server_address.get().await,
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
    }
}
