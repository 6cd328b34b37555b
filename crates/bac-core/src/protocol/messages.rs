//! Message types for the bac control channel and discovery broadcast.
//!
//! Every message on the wire is a single JSON object carrying the protocol
//! version under the `bac` key:
//!
//! ```text
//! client → server   {"bac": 1, "command":  "<name>", "args": [...]}
//! server → client   {"bac": 1, "response": "<name>", "args": [...]}
//! server → LAN      {"bac": 1, "name": "...", "address": "...", "port": 1234}
//! ```
//!
//! The four commands form a closed set, so they are modelled as the
//! [`Command`] enum with one payload per variant rather than a runtime
//! name-to-handler table.  Decoding from JSON lives in
//! [`crate::protocol::codec`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Protocol version carried in the `bac` field of every message.
pub const PROTOCOL_VERSION: i64 = 1;

/// UDP port the discovery broadcast is sent to.  Clients listen here.
pub const DEFAULT_BROADCAST_PORT: u16 = 38401;

/// Minimum delay between two discovery broadcasts.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the bytes taken from a session in a single read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Peripheral names a session may report.  Unknown keys are ignored.
pub const RECOGNIZED_PERIPHERALS: &[&str] = &["touch_points"];

/// Wire names of the four commands.
pub mod command_names {
    pub const GET_SLOTS: &str = "get_slots";
    pub const REQUEST_SLOT: &str = "request_slot";
    pub const RELINQUISH_SLOT: &str = "relinquish_slot";
    pub const UPDATE_PERIPHERALS: &str = "update_peripherals";
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// A request sent by a client over its control session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// List every slot with its availability.
    GetSlots,
    /// Claim the slot at `slot` (position in the server's roster).
    RequestSlot { slot: usize },
    /// Give up whatever slot this session holds.
    RelinquishSlot,
    /// Report fresh peripheral values.  Only applied while a slot is held.
    UpdatePeripherals(Map<String, Value>),
}

impl Command {
    /// Returns the wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetSlots => command_names::GET_SLOTS,
            Command::RequestSlot { .. } => command_names::REQUEST_SLOT,
            Command::RelinquishSlot => command_names::RELINQUISH_SLOT,
            Command::UpdatePeripherals(_) => command_names::UPDATE_PERIPHERALS,
        }
    }

    /// Returns the positional `args` array for this command.
    pub fn args(&self) -> Vec<Value> {
        match self {
            Command::GetSlots | Command::RelinquishSlot => Vec::new(),
            Command::RequestSlot { slot } => vec![Value::from(*slot)],
            Command::UpdatePeripherals(map) => vec![Value::Object(map.clone())],
        }
    }
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// Availability of one slot as reported by `get_slots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    /// Position of the slot in the roster; the value a client passes to
    /// `request_slot`.
    pub slot: usize,
    /// Display label, e.g. `"Player 1"`.
    pub name: String,
    /// `true` when no session currently holds the slot.
    pub available: bool,
}

/// A response written back to the session that issued a command.
///
/// `relinquish_slot` and `update_peripherals` never produce a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    GetSlots(Vec<SlotStatus>),
    RequestSlot { granted: bool },
}

impl Reply {
    /// Returns the wire name placed in the `response` field.
    pub fn name(&self) -> &'static str {
        match self {
            Reply::GetSlots(_) => command_names::GET_SLOTS,
            Reply::RequestSlot { .. } => command_names::REQUEST_SLOT,
        }
    }

    /// Returns the positional `args` array for this reply.
    ///
    /// The grant result of `request_slot` is sent as `1` or `0`.
    pub fn args(&self) -> Vec<Value> {
        match self {
            Reply::GetSlots(statuses) => statuses
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "slot": s.slot,
                        "name": s.name,
                        "available": s.available,
                    })
                })
                .collect(),
            Reply::RequestSlot { granted } => vec![Value::from(u8::from(*granted))],
        }
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Body of the periodic discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Protocol version; always [`PROTOCOL_VERSION`] when built by the server.
    pub bac: i64,
    /// Human-readable server name shown on the client.
    pub name: String,
    /// IP address of the control socket.
    pub address: String,
    /// TCP port of the control socket.
    pub port: u16,
}

impl Announcement {
    /// Builds an announcement for the current protocol version.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            bac: PROTOCOL_VERSION,
            name: name.into(),
            address: address.into(),
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_matches_wire_names() {
        assert_eq!(Command::GetSlots.name(), "get_slots");
        assert_eq!(Command::RequestSlot { slot: 0 }.name(), "request_slot");
        assert_eq!(Command::RelinquishSlot.name(), "relinquish_slot");
        assert_eq!(
            Command::UpdatePeripherals(Map::new()).name(),
            "update_peripherals"
        );
    }

    #[test]
    fn test_request_slot_args_carry_index() {
        let args = Command::RequestSlot { slot: 3 }.args();
        assert_eq!(args, vec![Value::from(3)]);
    }

    #[test]
    fn test_request_slot_reply_encodes_grant_as_integer() {
        assert_eq!(
            Reply::RequestSlot { granted: true }.args(),
            vec![Value::from(1)]
        );
        assert_eq!(
            Reply::RequestSlot { granted: false }.args(),
            vec![Value::from(0)]
        );
    }

    #[test]
    fn test_get_slots_reply_lists_every_status_in_order() {
        // Arrange
        let reply = Reply::GetSlots(vec![
            SlotStatus {
                slot: 0,
                name: "Player 1".to_string(),
                available: false,
            },
            SlotStatus {
                slot: 1,
                name: "Player 2".to_string(),
                available: true,
            },
        ]);

        // Act
        let args = reply.args();

        // Assert
        assert_eq!(args.len(), 2);
        assert_eq!(args[0]["slot"], 0);
        assert_eq!(args[0]["name"], "Player 1");
        assert_eq!(args[0]["available"], false);
        assert_eq!(args[1]["available"], true);
    }

    #[test]
    fn test_announcement_new_uses_current_version() {
        let a = Announcement::new("Living Room", "192.168.1.20", 5000);
        assert_eq!(a.bac, PROTOCOL_VERSION);
        assert_eq!(a.port, 5000);
    }
}
