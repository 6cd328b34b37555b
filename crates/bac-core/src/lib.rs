//! # bac-core
//!
//! Shared library for the bac input broker: the JSON wire protocol, the
//! stream framer, and the slot assignment domain.
//!
//! This crate is used by both the server and the client.  It opens no
//! sockets and spawns no threads.
//!
//! # Architecture overview
//!
//! bac lets phones and tablets on a LAN act as controllers for a host
//! application.  The host advertises itself with a UDP broadcast, clients
//! connect over TCP, claim a named **slot** ("Player 1"), and stream
//! peripheral state such as touch points while they hold it.
//!
//! - **`protocol`** – Message types, the command/reply codec, and
//!   [`JsonFramer`], which cuts complete JSON objects out of a byte stream.
//!
//! - **`domain`** – The [`SlotRoster`] and per-session [`SessionSlots`]: who
//!   holds which slot, and the exclusive-ownership rules that govern it.

pub mod domain;
pub mod protocol;

pub use domain::slots::{
    Peripherals, SessionId, SessionSlots, Slot, SlotIndex, SlotRoster,
};
pub use protocol::codec::{decode_command, decode_reply, encode_command, encode_reply, ProtocolError};
pub use protocol::framing::{FrameError, JsonFramer};
pub use protocol::messages::{Announcement, Command, Reply, SlotStatus, PROTOCOL_VERSION};
