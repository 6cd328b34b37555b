//! One client control connection.
//!
//! A [`Session`] owns the non-blocking TCP stream, the peer address, the
//! per-connection [`JsonFramer`], and the slot/peripheral state reported
//! through it.  The event loop calls [`Session::poll`] once per pass; each
//! call makes exactly one non-blocking read, so one slow client can never
//! hold up the others.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use bac_core::protocol::READ_CHUNK_SIZE;
use bac_core::{FrameError, JsonFramer, SessionSlots};
use serde_json::Value;
use tracing::debug;

/// Result of one [`Session::poll`].
#[derive(Debug)]
pub enum PollOutcome {
    /// No data was waiting.
    Idle,
    /// Bytes arrived; these are the objects they completed (possibly none).
    Frames(Vec<Result<Value, FrameError>>),
    /// The peer closed the stream or the read failed.  The session is dead.
    Closed,
}

/// Result of [`Session::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The socket buffer was full; nothing of the message was written.
    WouldBlock,
    /// The write failed, or stopped part-way through the message.  The
    /// session is dead.
    Closed,
}

/// A connected client and its decoding state.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    framer: JsonFramer,
    /// Held slot and reported peripherals.
    pub slots: SessionSlots,
}

impl Session {
    /// Wraps an accepted stream, switching it to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the socket cannot be made non-blocking.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        // Small, latency-sensitive messages.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle for {peer}: {e}");
        }
        Ok(Self {
            stream,
            peer,
            framer: JsonFramer::new(),
            slots: SessionSlots::new(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Performs a single non-blocking read and frames whatever arrived.
    pub fn poll(&mut self) -> PollOutcome {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        match self.stream.read(&mut buf) {
            Ok(0) => PollOutcome::Closed,
            Ok(n) => PollOutcome::Frames(self.framer.feed(&buf[..n])),
            Err(e) if is_would_block(&e) => PollOutcome::Idle,
            Err(e) => {
                debug!("read from {} failed: {e}", self.peer);
                PollOutcome::Closed
            }
        }
    }

    /// Writes `bytes` immediately.  Nothing is queued.
    ///
    /// A message is either written whole or not at all; if the socket fills
    /// up after part of it went out, the peer's stream is out of step and
    /// the outcome is [`SendOutcome::Closed`].
    pub fn send(&mut self, bytes: &[u8]) -> SendOutcome {
        write_message(&mut self.stream, bytes, self.peer)
    }

    /// Shuts the transport down in both directions.
    pub fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("shutdown of {} failed: {e}", self.peer);
        }
    }

    /// Bytes of an unfinished message held for the next read.
    pub fn buffered_len(&self) -> usize {
        self.framer.buffered_len()
    }
}

fn write_message<W: Write>(writer: &mut W, bytes: &[u8], peer: SocketAddr) -> SendOutcome {
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]) {
            Ok(0) => {
                debug!("write to {peer} returned zero bytes");
                return SendOutcome::Closed;
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if written == 0 {
                    return SendOutcome::WouldBlock;
                }
                debug!(
                    "write to {peer} stopped after {written} of {} bytes",
                    bytes.len()
                );
                return SendOutcome::Closed;
            }
            Err(e) => {
                debug!("write to {peer} failed: {e}");
                return SendOutcome::Closed;
            }
        }
    }
    SendOutcome::Sent
}

/// Returns `true` for the "no data yet" conditions of a non-blocking socket.
pub(crate) fn is_would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
