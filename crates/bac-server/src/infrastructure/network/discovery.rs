//! UDP broadcast-based server discovery.
//!
//! The server periodically sends a fixed [`Announcement`] datagram to the
//! LAN broadcast address on the discovery port (default 38401).  Clients
//! listen on that port, read the server's name, address and control port,
//! and connect without any prior configuration.
//!
//! # How the broadcast works
//!
//! 1. At startup the announcement `{bac, name, address, port}` is encoded
//!    once and kept as raw bytes.
//! 2. Every event-loop pass calls [`Broadcaster::maybe_broadcast`].  If more
//!    than the configured interval has passed since the last send, the bytes
//!    go out to `255.255.255.255:38401` (or the configured target).
//! 3. Sending is fire-and-forget.  A failure (no network, no route) is
//!    logged at `debug` and otherwise treated like a success; the next
//!    attempt happens one interval later.
//!
//! The socket is non-blocking so a full send buffer can never stall the
//! loop.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use bac_core::protocol::{encode_announcement, Announcement};
use thiserror::Error;
use tracing::{debug, trace};

/// Error type for discovery setup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// A socket option could not be applied.
    #[error("failed to configure discovery socket: {0}")]
    Configure(#[source] std::io::Error),
}

/// Rate-limited sender of the discovery datagram.
#[derive(Debug)]
pub struct Broadcaster {
    socket: UdpSocket,
    target: SocketAddr,
    payload: Vec<u8>,
    interval: Duration,
    last_sent: Option<Instant>,
}

impl Broadcaster {
    /// Binds an ephemeral broadcast-enabled socket and precomputes the
    /// datagram for `announcement`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the socket cannot be bound or configured.
    pub fn new(
        announcement: &Announcement,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self, DiscoveryError> {
        let unspecified = match target.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let addr = SocketAddr::new(unspecified, 0);
        let socket =
            UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        socket.set_broadcast(true).map_err(DiscoveryError::Configure)?;
        socket
            .set_nonblocking(true)
            .map_err(DiscoveryError::Configure)?;

        Ok(Self {
            socket,
            target,
            payload: encode_announcement(announcement),
            interval,
            last_sent: None,
        })
    }

    /// Returns `true` when the next call to [`maybe_broadcast`](Self::maybe_broadcast)
    /// with the same `now` would send.  The very first check is always due.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Sends the announcement if the interval has elapsed.
    ///
    /// Returns `true` if a send was attempted, regardless of its outcome.
    pub fn maybe_broadcast(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        match self.socket.send_to(&self.payload, self.target) {
            Ok(_) => trace!("discovery broadcast sent to {}", self.target),
            Err(e) => debug!("discovery broadcast to {} failed: {e}", self.target),
        }
        self.last_sent = Some(now);
        true
    }

    /// The encoded datagram.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
