//! Platform link seam: peer discovery and one point-to-point channel at a time.
//!
//! The host implements [`Link`] on top of its radio stack (Wi-Fi P2P groups, a simulator, ...)
//! and reports what happens through [`crate::watchdog::Event`]s.

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// What the platform knows about a freshly formed group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// True when this device owns the group and therefore takes the server role.
    pub is_group_owner: bool,
    /// Address of the group owner. `None` means no group was actually formed.
    pub group_owner: Option<IpAddr>,
}

impl ConnectionInfo {
    pub fn owner(address: IpAddr) -> Self {
        Self {
            is_group_owner: true,
            group_owner: Some(address),
        }
    }

    pub fn client(owner: IpAddr) -> Self {
        Self {
            is_group_owner: false,
            group_owner: Some(owner),
        }
    }
}

/// Platform connectivity service.
#[async_trait]
pub trait Link: Send + Sync {
    type Channel: AsyncRead + AsyncWrite + Unpin + Send;

    /// Release the current group, if any. Idempotent.
    async fn remove_group(&self) -> Result<(), LinkError>;

    /// Ask the platform to connect to the peer at `address`. Completion is reported
    /// later as a connection event.
    async fn connect(&self, address: &str) -> Result<(), LinkError>;

    /// Obtain the byte-stream channel for the group described by `info`.
    async fn open_channel(&self, info: &ConnectionInfo) -> io::Result<Self::Channel>;

    /// Ask the platform to scan for peers again; results arrive as a peer-list event.
    async fn discover_peers(&self) -> Result<(), LinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link busy")]
    Busy,
    #[error("operation unsupported by this platform")]
    Unsupported,
    #[error("link failure: {0}")]
    Failed(String),
}

/// Channel opener for TCP-like links: the group owner accepts on its listener,
/// everyone else connects to the owner on `port`.
pub struct TcpChannels {
    listener: TcpListener,
    port: u16,
}

impl TcpChannels {
    /// Listen on all interfaces at `port` (normally [`crate::wire::DEFAULT_PORT`]).
    pub async fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self::from_listener(listener, port))
    }

    /// `port` is the port peers listen on, which may differ from this listener's in tests.
    pub fn from_listener(listener: TcpListener, port: u16) -> Self {
        Self { listener, port }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn open(&self, info: &ConnectionInfo) -> io::Result<TcpStream> {
        if info.is_group_owner {
            let (stream, _) = self.listener.accept().await?;
            return Ok(stream);
        }
        let owner = info
            .group_owner
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no group owner"))?;
        TcpStream::connect(SocketAddr::new(owner, self.port)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identifier;
    use crate::wire::Wire;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn tcp_owner_accepts_and_client_connects() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let owner = TcpChannels::from_listener(listener, port);
        let client_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client = TcpChannels::from_listener(client_listener, port);

        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let owner_info = ConnectionInfo::owner(localhost);
        let client_info = ConnectionInfo::client(localhost);
        let (accepted, connected) =
            tokio::join!(owner.open(&owner_info), client.open(&client_info));

        let mut server = Wire::new(accepted.unwrap());
        let mut client = Wire::new(connected.unwrap());
        let id = Identifier::random();
        client.send_magic().await.unwrap();
        client.send_id(&id).await.unwrap();
        client.flush().await.unwrap();
        assert!(server.recv_magic().await.unwrap().is_some());
        assert_eq!(server.recv_id().await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn client_without_owner_fails() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let channels = TcpChannels::from_listener(listener, 1);
        let info = ConnectionInfo {
            is_group_owner: false,
            group_owner: None,
        };
        let err = channels.open(&info).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
