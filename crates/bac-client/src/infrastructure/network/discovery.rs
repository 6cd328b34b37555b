//! Finding a server on the LAN.
//!
//! Servers broadcast a small JSON announcement on the discovery port about
//! once a second.  [`find_server`] binds that port and waits for the first
//! datagram that is a valid announcement for our protocol version.
//! Anything else arriving on the port (other versions, other programs) is
//! skipped.
//!
//! A server bound to all interfaces may announce `0.0.0.0`; in that case the
//! source address of the datagram is the address to dial.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bac_core::protocol::decode_announcement;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use super::ClientError;

/// A server that answered discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub name: String,
    /// Address of the control socket.
    pub addr: SocketAddr,
}

/// Binds `0.0.0.0:port` and waits up to `timeout` for an announcement.
///
/// # Errors
///
/// Returns [`ClientError::BindFailed`] if the port is taken and
/// [`ClientError::Timeout`] if no server was heard in time.
pub async fn find_server(port: u16, timeout: Duration) -> Result<DiscoveredServer, ClientError> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| ClientError::BindFailed { addr, source })?;
    wait_for_announcement(&socket, timeout).await
}

/// Waits on an already-bound socket for the first usable announcement.
///
/// # Errors
///
/// Returns [`ClientError::Timeout`] when `timeout` elapses first, or
/// [`ClientError::Io`] if receiving fails.
pub async fn wait_for_announcement(
    socket: &UdpSocket,
    timeout: Duration,
) -> Result<DiscoveredServer, ClientError> {
    tokio::time::timeout(timeout, listen(socket))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

async fn listen(socket: &UdpSocket) -> Result<DiscoveredServer, ClientError> {
    let mut buf = [0u8; 1024];
    loop {
        let (len, source) = socket.recv_from(&mut buf).await?;
        if let Some(server) = interpret(&buf[..len], source) {
            info!("discovered server {:?} at {}", server.name, server.addr);
            return Ok(server);
        }
    }
}

/// Turns one datagram into a server, or `None` if it should be skipped.
fn interpret(datagram: &[u8], source: SocketAddr) -> Option<DiscoveredServer> {
    let announcement = match decode_announcement(datagram) {
        Ok(a) => a,
        Err(e) => {
            debug!("ignoring datagram from {source}: {e}");
            return None;
        }
    };
    let ip: IpAddr = match announcement.address.parse() {
        Ok(ip) => ip,
        Err(_) => {
            debug!(
                "ignoring announcement from {source}: bad address {:?}",
                announcement.address
            );
            return None;
        }
    };
    let ip = if ip.is_unspecified() { source.ip() } else { ip };
    Some(DiscoveredServer {
        name: announcement.name,
        addr: SocketAddr::new(ip, announcement.port),
    })
}
