//! bac-client library entry point.
//!
//! A small async client for the bac slot protocol: find a server by its UDP
//! announcement, open the control connection, and issue the four commands.
//! The `bac-client` binary uses it as a command-line tester, and the
//! integration tests use it to drive a real server.

/// Infrastructure layer: discovery and the control connection.
pub mod infrastructure;

pub use infrastructure::network::connection::ControllerClient;
pub use infrastructure::network::discovery::{find_server, wait_for_announcement, DiscoveredServer};
pub use infrastructure::network::ClientError;
