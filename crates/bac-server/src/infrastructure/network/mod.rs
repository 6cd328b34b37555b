//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Sends the UDP announcement that lets clients find the
//!   server without manual IP configuration.
//!
//! - **`session`** – One accepted control connection: non-blocking reads,
//!   framing, and immediate reply writes.
//!
//! - **`server`** – The single-threaded event loop tying the listener, the
//!   sessions, and the broadcaster together.

pub mod discovery;
pub mod server;
pub mod session;
