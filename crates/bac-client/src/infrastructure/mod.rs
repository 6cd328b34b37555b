//! Infrastructure layer for the client.
//!
//! Everything here talks to the network; see [`network`].

pub mod network;
