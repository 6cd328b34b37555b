//! Infrastructure layer for the server.
//!
//! Contains OS-facing adapters: the TCP/UDP sockets and the event loop that
//! drives them, plus file-system configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and `bac_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod network;
pub mod storage;
