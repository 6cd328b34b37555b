//! Network infrastructure for the client.
//!
//! - **`discovery`** – listens on the discovery port for a server
//!   announcement.
//! - **`connection`** – the TCP control connection and its request helpers.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub mod connection;
pub mod discovery;

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The discovery port could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on an established socket.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Nothing arrived within the allowed time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The server answered a different command than the one just sent.
    #[error("expected a {expected} reply, got {got}")]
    UnexpectedReply {
        expected: &'static str,
        got: &'static str,
    },
    /// The connection was closed by the server.
    #[error("connection closed by server")]
    Closed,
}
