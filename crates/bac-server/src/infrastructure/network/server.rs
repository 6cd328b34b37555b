//! Server: the single-threaded, non-blocking event loop.
//!
//! A [`Server`] owns the listening socket, the slot roster, the live
//! sessions, the discovery broadcaster, and the event log.  The host
//! application calls [`Server::process`] repeatedly; each call performs one
//! pass and returns without blocking or sleeping:
//!
//! ```text
//! process()
//!  ├─ 1. broadcast the announcement if the interval has elapsed
//!  ├─ 2. try one non-blocking accept  → new Session appended to the live set
//!  └─ 3. for each live Session, in order:
//!         poll once → frame → decode → dispatch → reply
//!         (closed transport ⇒ relinquish slot, drop session)
//! ```
//!
//! There is exactly one thread of control, so the roster needs no locking.
//! "Would block" on accept or read is the normal idle state and is never
//! reported as an error.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::time::{Duration, Instant};

use bac_core::protocol::{
    decode_command, encode_reply, Announcement, DEFAULT_BROADCAST_INTERVAL, DEFAULT_BROADCAST_PORT,
};
use bac_core::{Peripherals, SlotIndex, SlotRoster, SlotStatus};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::dispatch::dispatch;
use crate::application::events::{EventLog, ServerEvent, TracingLog};
use crate::infrastructure::network::discovery::{Broadcaster, DiscoveryError};
use crate::infrastructure::network::session::{is_would_block, PollOutcome, SendOutcome, Session};

/// Error type for server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to configure listening socket: {0}")]
    Configure(#[source] std::io::Error),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Runtime settings for a [`Server`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    /// Name carried in the discovery announcement.
    pub name: String,
    /// Address the control socket binds to.  `127.0.0.1` accepts local
    /// connections only.
    pub bind_address: IpAddr,
    /// Control port; `0` lets the OS pick a free one.
    pub port: u16,
    /// Destination of the discovery datagram.
    pub broadcast_target: SocketAddr,
    /// Minimum time between two discovery datagrams.
    pub broadcast_interval: Duration,
    /// Address placed in the announcement instead of the bound address.
    pub advertise_address: Option<IpAddr>,
    /// Connections beyond this many live sessions are closed on accept.
    pub max_sessions: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "bac server".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            broadcast_target: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::BROADCAST),
                DEFAULT_BROADCAST_PORT,
            ),
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            advertise_address: None,
            max_sessions: None,
        }
    }
}

/// The broker: slot roster, live sessions, and the loop that drives them.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    announcement: Announcement,
    roster: SlotRoster,
    sessions: Vec<Session>,
    broadcaster: Broadcaster,
    max_sessions: Option<usize>,
    log: Box<dyn EventLog>,
}

impl Server {
    /// Binds the control socket and the discovery socket.
    ///
    /// The server starts with an empty roster and logs through
    /// [`TracingLog`]; see [`Server::with_log`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if either socket cannot be set up.
    pub fn bind(options: &ServerOptions) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(options.bind_address, options.port);
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::Configure)?;
        let local_addr = listener.local_addr().map_err(ServerError::Configure)?;

        let advertised = options.advertise_address.unwrap_or(local_addr.ip());
        let announcement =
            Announcement::new(options.name.clone(), advertised.to_string(), local_addr.port());
        let broadcaster = Broadcaster::new(
            &announcement,
            options.broadcast_target,
            options.broadcast_interval,
        )?;

        info!(
            "server {:?} listening on {local_addr}, announcing to {}",
            options.name, options.broadcast_target
        );

        Ok(Self {
            listener,
            local_addr,
            announcement,
            roster: SlotRoster::new(),
            sessions: Vec::new(),
            broadcaster,
            max_sessions: options.max_sessions,
            log: Box::new(TracingLog),
        })
    }

    /// Replaces the event log.
    pub fn with_log(mut self, log: impl EventLog + 'static) -> Self {
        self.log = Box::new(log);
        self
    }

    /// Adds a slot to the roster.  Call before the first [`process`](Self::process).
    pub fn add_slot(&mut self, name: impl Into<String>) -> SlotIndex {
        let name = name.into();
        let index = self.roster.add_slot(name.clone());
        debug!("slot {index} added: {name:?}");
        index
    }

    /// Runs one pass of the event loop.  Never blocks.
    pub fn process(&mut self) {
        self.broadcaster.maybe_broadcast(Instant::now());
        self.accept_one();

        let roster = &mut self.roster;
        let log = self.log.as_ref();
        self.sessions
            .retain_mut(|session| service_session(session, roster, log));
    }

    fn accept_one(&mut self) {
        let (stream, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) if is_would_block(&e) => return,
            Err(e) => {
                debug!("accept failed: {e}");
                return;
            }
        };

        if let Some(limit) = self.max_sessions {
            if self.sessions.len() >= limit {
                if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                    debug!("shutdown of rejected {peer} failed: {e}");
                }
                self.log.record(ServerEvent::Rejected { peer, limit });
                return;
            }
        }

        match Session::new(stream, peer) {
            Ok(session) => {
                self.log.record(ServerEvent::Connected {
                    peer,
                    session: session.slots.id(),
                });
                self.sessions.push(session);
            }
            Err(e) => warn!("could not set up session for {peer}: {e}"),
        }
    }

    // ── Accessors for the host application ───────────────────────────────────

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn name(&self) -> &str {
        &self.announcement.name
    }

    /// The announcement broadcast for discovery.
    pub fn announcement(&self) -> &Announcement {
        &self.announcement
    }

    pub fn roster(&self) -> &SlotRoster {
        &self.roster
    }

    /// Availability of every slot, as `get_slots` would report it.
    pub fn slot_statuses(&self) -> Vec<SlotStatus> {
        self.roster.statuses()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Peripherals of the session currently holding slot `index`.
    pub fn occupant_peripherals(&self, index: SlotIndex) -> Option<&Peripherals> {
        let occupant = self.roster.occupant(index)?;
        self.sessions
            .iter()
            .find(|s| s.slots.id() == occupant)
            .map(|s| &s.slots.peripherals)
    }

    /// Last value of peripheral `name` reported by slot `index`'s occupant.
    pub fn peripheral(&self, index: SlotIndex, name: &str) -> Option<&Value> {
        self.occupant_peripherals(index)?.get(name)
    }

    /// Touch points reported by slot `index`'s occupant.
    pub fn touch_points(&self, index: SlotIndex) -> Option<&Value> {
        self.peripheral(index, "touch_points")
    }
}

/// Polls one session and handles everything it delivered.
///
/// Returns `false` when the session died and must leave the live set.
fn service_session(session: &mut Session, roster: &mut SlotRoster, log: &dyn EventLog) -> bool {
    let peer = session.peer();
    let frames = match session.poll() {
        PollOutcome::Idle => return true,
        PollOutcome::Closed => {
            end_session(session, roster, log);
            return false;
        }
        PollOutcome::Frames(frames) => frames,
    };

    for frame in frames {
        let value = match frame {
            Ok(value) => value,
            Err(e) => {
                log.record(ServerEvent::MalformedFrame {
                    peer,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let command = match decode_command(&value) {
            Ok(command) => command,
            Err(e) => {
                log.record(ServerEvent::from_protocol_error(peer, e));
                continue;
            }
        };

        log.record(ServerEvent::CommandReceived {
            peer,
            command: command.clone(),
        });

        let Some(reply) = dispatch(roster, &mut session.slots, command) else {
            continue;
        };

        match session.send(&encode_reply(&reply)) {
            SendOutcome::Sent => log.record(ServerEvent::ReplySent { peer, reply }),
            SendOutcome::WouldBlock => log.record(ServerEvent::ReplyDropped {
                peer,
                response: reply.name(),
            }),
            SendOutcome::Closed => {
                end_session(session, roster, log);
                return false;
            }
        }
    }
    true
}

/// Closes the transport and releases the session's slot.
fn end_session(session: &mut Session, roster: &mut SlotRoster, log: &dyn EventLog) {
    session.close();
    let released = roster.relinquish(&mut session.slots);
    log.record(ServerEvent::Disconnected {
        peer: session.peer(),
        session: session.slots.id(),
        released,
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{MockEventLog, NullLog, RecordingLog};
    use std::io::{Read, Write};
    use std::net::{TcpStream, UdpSocket};

    /// Options for a loopback server whose broadcasts go to `target`.
    fn loopback_options(target: SocketAddr) -> ServerOptions {
        ServerOptions {
            name: "Test Server".to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast_target: target,
            broadcast_interval: Duration::from_secs(3600),
            ..ServerOptions::default()
        }
    }

    fn discovery_sink() -> (UdpSocket, SocketAddr) {
        let sink = UdpSocket::bind("127.0.0.1:0").expect("sink bind");
        let addr = sink.local_addr().unwrap();
        (sink, addr)
    }

    fn pump(server: &mut Server, passes: usize) {
        for _ in 0..passes {
            server.process();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn connect(server: &mut Server) -> TcpStream {
        let before = server.session_count();
        let stream = TcpStream::connect(server.local_addr()).expect("connect");
        for _ in 0..500 {
            server.process();
            if server.session_count() > before {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        stream
    }

    #[test]
    fn test_bind_reports_os_assigned_port() {
        let (_sink, target) = discovery_sink();
        let server = Server::bind(&loopback_options(target)).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.announcement().port, server.local_addr().port());
        assert_eq!(server.announcement().address, "127.0.0.1");
    }

    #[test]
    fn test_bind_uses_advertise_address_override() {
        let (_sink, target) = discovery_sink();
        let options = ServerOptions {
            advertise_address: Some("10.1.2.3".parse().unwrap()),
            ..loopback_options(target)
        };
        let server = Server::bind(&options).unwrap();
        assert_eq!(server.announcement().address, "10.1.2.3");
    }

    #[test]
    fn test_process_with_no_clients_is_a_no_op() {
        let (_sink, target) = discovery_sink();
        let mut server = Server::bind(&loopback_options(target)).unwrap().with_log(NullLog);
        server.add_slot("Player 1");

        pump(&mut server, 3);

        assert_eq!(server.session_count(), 0);
        assert!(server.slot_statuses()[0].available);
    }

    #[test]
    fn test_process_accepts_connection_and_logs_it() {
        // Arrange
        let (_sink, target) = discovery_sink();
        let log = RecordingLog::new();
        let mut server = Server::bind(&loopback_options(target))
            .unwrap()
            .with_log(log.clone());

        // Act
        let _client = connect(&mut server);

        // Assert
        assert_eq!(server.session_count(), 1);
        assert!(matches!(log.events()[0], ServerEvent::Connected { .. }));
    }

    #[test]
    fn test_session_limit_rejects_extra_connections() {
        let (_sink, target) = discovery_sink();
        let log = RecordingLog::new();
        let options = ServerOptions {
            max_sessions: Some(1),
            ..loopback_options(target)
        };
        let mut server = Server::bind(&options).unwrap().with_log(log.clone());

        let _first = connect(&mut server);
        let mut second = TcpStream::connect(server.local_addr()).unwrap();
        pump(&mut server, 20);

        assert_eq!(server.session_count(), 1);
        assert!(log
            .events()
            .iter()
            .any(|e| matches!(e, ServerEvent::Rejected { limit: 1, .. })));
        second
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let mut buf = [0u8; 16];
        let n = second.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0, "a rejected connection is shut down by the server");
    }

    #[test]
    fn test_version_mismatch_is_logged_once_and_not_answered() {
        // Arrange: a strict mock that only allows the connect and the mismatch.
        let (_sink, target) = discovery_sink();
        let mut mock = MockEventLog::new();
        mock.expect_record()
            .withf(|e| matches!(e, ServerEvent::Connected { .. }))
            .times(1)
            .return_const(());
        mock.expect_record()
            .withf(|e| matches!(e, ServerEvent::VersionMismatch { found: Some(v), .. } if v == 2))
            .times(1)
            .return_const(());
        let mut server = Server::bind(&loopback_options(target)).unwrap().with_log(mock);
        server.add_slot("Player 1");
        let mut client = connect(&mut server);
        client
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();

        // Act
        client
            .write_all(br#"{"bac": 2, "command": "request_slot", "args": [0]}"#)
            .unwrap();
        pump(&mut server, 50);

        // Assert
        let mut buf = [0u8; 256];
        assert!(client.read(&mut buf).is_err(), "no reply may be sent");
        assert!(server.slot_statuses()[0].available);
        assert_eq!(server.session_count(), 1);
    }

    #[test]
    fn test_touch_points_follow_the_slot_occupant() {
        let (_sink, target) = discovery_sink();
        let mut server = Server::bind(&loopback_options(target)).unwrap().with_log(NullLog);
        server.add_slot("Player 1");
        let mut client = connect(&mut server);
        client
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();

        client
            .write_all(b"{\"bac\":1,\"command\":\"request_slot\",\"args\":[0]}\n")
            .unwrap();
        client
            .write_all(b"{\"bac\":1,\"command\":\"update_peripherals\",\"args\":[{\"touch_points\":[[7,8]]}]}\n")
            .unwrap();
        for _ in 0..500 {
            server.process();
            if server.touch_points(0).is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(server.touch_points(0), Some(&serde_json::json!([[7, 8]])));
        assert_eq!(server.touch_points(1), None);
    }
}
