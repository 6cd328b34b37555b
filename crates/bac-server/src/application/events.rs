//! Session-level events and the log handle that receives them.
//!
//! The event loop reports everything notable that happens on a control
//! session (connects, disconnects, traffic, dropped messages) as a
//! [`ServerEvent`] handed to an [`EventLog`].  The server owns its log as a
//! `Box<dyn EventLog>`, so silencing or capturing the output is a matter of
//! passing a different handle, not flipping a global flag.
//!
//! # Implementations
//!
//! - [`TracingLog`] – the default; forwards to `tracing` macros.
//! - [`NullLog`] – discards everything.
//! - [`RecordingLog`] – stores events in memory so tests can assert on them.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bac_core::{Command, ProtocolError, Reply, SessionId, SlotIndex};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Something that happened on a control session.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A client connected and a session was created.
    Connected { peer: SocketAddr, session: SessionId },
    /// A connection was closed at once because the session limit is reached.
    Rejected { peer: SocketAddr, limit: usize },
    /// A session's transport closed; `released` is the slot it gave up.
    Disconnected {
        peer: SocketAddr,
        session: SessionId,
        released: Option<SlotIndex>,
    },
    /// A command was decoded and is about to be dispatched.
    CommandReceived { peer: SocketAddr, command: Command },
    /// A reply was written to the session.
    ReplySent { peer: SocketAddr, reply: Reply },
    /// A message carried the wrong (or no) `bac` version and was dropped.
    VersionMismatch {
        peer: SocketAddr,
        found: Option<Value>,
    },
    /// A well-versioned message named a command outside the known set.
    UnknownCommand { peer: SocketAddr, name: String },
    /// A message was dropped for any other shape problem.
    InvalidCommand {
        peer: SocketAddr,
        error: ProtocolError,
    },
    /// A closed brace span was not valid JSON.
    MalformedFrame { peer: SocketAddr, error: String },
    /// The socket buffer was full, so the reply was not written.
    ReplyDropped { peer: SocketAddr, response: &'static str },
}

impl ServerEvent {
    /// Maps a decode failure to the matching event.
    pub fn from_protocol_error(peer: SocketAddr, error: ProtocolError) -> Self {
        match error {
            ProtocolError::VersionMismatch { found } => ServerEvent::VersionMismatch { peer, found },
            ProtocolError::UnknownCommand(name) => ServerEvent::UnknownCommand { peer, name },
            error => ServerEvent::InvalidCommand { peer, error },
        }
    }
}

/// Receiver of [`ServerEvent`]s.
#[cfg_attr(test, mockall::automock)]
pub trait EventLog: Send {
    fn record(&self, event: ServerEvent);
}

/// Forwards events to `tracing`.
///
/// Connects and disconnects log at `info`, traffic at `debug`, and dropped
/// messages at `warn`.  Unknown commands are dropped silently apart from a
/// `debug` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn record(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { peer, session } => {
                info!("device connected: {peer} (session {session})");
            }
            ServerEvent::Rejected { peer, limit } => {
                warn!("device rejected: {peer} (limit of {limit} sessions reached)");
            }
            ServerEvent::Disconnected {
                peer,
                session,
                released,
            } => match released {
                Some(slot) => info!("device disconnected: {peer} (session {session}, released slot {slot})"),
                None => info!("device disconnected: {peer} (session {session})"),
            },
            ServerEvent::CommandReceived { peer, command } => {
                debug!("-> {peer}: {} {}", command.name(), serde_json::Value::Array(command.args()));
            }
            ServerEvent::ReplySent { peer, reply } => {
                debug!("<- {peer}: {} {}", reply.name(), serde_json::Value::Array(reply.args()));
            }
            ServerEvent::VersionMismatch { peer, found } => {
                warn!("{peer} sent wrong protocol version: {found:?}");
            }
            ServerEvent::UnknownCommand { peer, name } => {
                debug!("{peer} sent unknown command {name:?}; dropped");
            }
            ServerEvent::InvalidCommand { peer, error } => {
                warn!("{peer} sent an invalid command: {error}");
            }
            ServerEvent::MalformedFrame { peer, error } => {
                warn!("{peer} sent malformed JSON: {error}");
            }
            ServerEvent::ReplyDropped { peer, response } => {
                warn!("reply {response} to {peer} dropped: socket buffer full");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl EventLog for NullLog {
    fn record(&self, _event: ServerEvent) {}
}

/// Keeps every event in memory.
///
/// Clones share the same buffer: hand one clone to the server and keep the
/// other to inspect what was recorded.
#[derive(Debug, Default, Clone)]
pub struct RecordingLog {
    events: Arc<Mutex<Vec<ServerEvent>>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<ServerEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.events.lock() {
            guard.clear();
        }
    }
}

impl EventLog for RecordingLog {
    fn record(&self, event: ServerEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
