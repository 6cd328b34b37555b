//! JSON codec for bac commands, replies, and discovery announcements.
//!
//! Wire format of a control message:
//! ```text
//! {"bac": <version>, "command" | "response": <name>, "args": [...]}\n
//! ```
//! The trailing newline is a separator only.  Receivers do not depend on it:
//! the [`crate::protocol::framing::JsonFramer`] skips anything between
//! top-level objects.
//!
//! Decoding is split from framing.  The framer yields parsed
//! [`serde_json::Value`]s and this module validates their shape.  Every
//! decode failure is non-fatal for the connection: the caller logs it and
//! drops the message.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::messages::{
    command_names, Announcement, Command, Reply, SlotStatus, PROTOCOL_VERSION,
};

/// Errors produced while interpreting a decoded JSON value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The message is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The `bac` field is missing or does not equal [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {found:?}")]
    VersionMismatch { found: Option<Value> },

    /// The object has no string `command` (or `response`) field.
    #[error("message has no {0} field")]
    MissingName(&'static str),

    /// The `command` (or `response`) name is not one of the known four.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command is known but its `args` do not fit it.
    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments {
        command: &'static str,
        reason: String,
    },

    /// A discovery datagram could not be parsed.
    #[error("malformed announcement: {0}")]
    MalformedAnnouncement(String),
}

// ── Commands (client → server) ────────────────────────────────────────────────

/// Interprets a framed JSON value as a [`Command`].
///
/// `args` defaults to an empty array when absent, but must be an array
/// when present.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the value is not an object, carries the
/// wrong `bac` version, names an unknown command, or supplies arguments that
/// do not match the command's arity or types.
pub fn decode_command(value: &Value) -> Result<Command, ProtocolError> {
    let obj = versioned_object(value)?;
    let name = obj
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingName("command"))?;

    match name {
        command_names::GET_SLOTS => {
            let args = args_of(obj, command_names::GET_SLOTS)?;
            expect_arity(command_names::GET_SLOTS, args, 0)?;
            Ok(Command::GetSlots)
        }
        command_names::REQUEST_SLOT => {
            let args = args_of(obj, command_names::REQUEST_SLOT)?;
            expect_arity(command_names::REQUEST_SLOT, args, 1)?;
            let slot = args[0]
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| ProtocolError::InvalidArguments {
                    command: command_names::REQUEST_SLOT,
                    reason: format!("slot index must be a non-negative integer, got {}", args[0]),
                })?;
            Ok(Command::RequestSlot { slot })
        }
        command_names::RELINQUISH_SLOT => {
            let args = args_of(obj, command_names::RELINQUISH_SLOT)?;
            expect_arity(command_names::RELINQUISH_SLOT, args, 0)?;
            Ok(Command::RelinquishSlot)
        }
        command_names::UPDATE_PERIPHERALS => {
            let args = args_of(obj, command_names::UPDATE_PERIPHERALS)?;
            expect_arity(command_names::UPDATE_PERIPHERALS, args, 1)?;
            let map = args[0]
                .as_object()
                .ok_or_else(|| ProtocolError::InvalidArguments {
                    command: command_names::UPDATE_PERIPHERALS,
                    reason: "peripherals must be a JSON object".to_string(),
                })?;
            Ok(Command::UpdatePeripherals(map.clone()))
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

/// Serializes a [`Command`] followed by the newline separator.
pub fn encode_command(command: &Command) -> Vec<u8> {
    encode_envelope("command", command.name(), command.args())
}

// ── Replies (server → client) ─────────────────────────────────────────────────

/// Serializes a [`Reply`] followed by the newline separator.
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    encode_envelope("response", reply.name(), reply.args())
}

/// Interprets a framed JSON value as a [`Reply`].
///
/// The `request_slot` grant is accepted both as `1`/`0` and as a boolean.
///
/// # Errors
///
/// Returns [`ProtocolError`] for the same shape violations as
/// [`decode_command`].
pub fn decode_reply(value: &Value) -> Result<Reply, ProtocolError> {
    let obj = versioned_object(value)?;
    let name = obj
        .get("response")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingName("response"))?;

    match name {
        command_names::GET_SLOTS => {
            let statuses = args_of(obj, command_names::GET_SLOTS)?
                .iter()
                .map(|entry| {
                    serde_json::from_value::<SlotStatus>(entry.clone()).map_err(|e| {
                        ProtocolError::InvalidArguments {
                            command: command_names::GET_SLOTS,
                            reason: e.to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Reply::GetSlots(statuses))
        }
        command_names::REQUEST_SLOT => {
            let args = args_of(obj, command_names::REQUEST_SLOT)?;
            expect_arity(command_names::REQUEST_SLOT, args, 1)?;
            let granted = match &args[0] {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_i64() == Some(1),
                other => {
                    return Err(ProtocolError::InvalidArguments {
                        command: command_names::REQUEST_SLOT,
                        reason: format!("grant must be 0/1 or a boolean, got {other}"),
                    })
                }
            };
            Ok(Reply::RequestSlot { granted })
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Serializes an [`Announcement`] as a bare JSON object (no separator).
pub fn encode_announcement(announcement: &Announcement) -> Vec<u8> {
    // A struct of strings and integers cannot fail to serialize.
    serde_json::to_vec(announcement).unwrap_or_default()
}

/// Parses a discovery datagram, rejecting other protocol versions.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedAnnouncement`] if the datagram is not a
/// valid announcement, or [`ProtocolError::VersionMismatch`] if it is one for
/// a different protocol version.
pub fn decode_announcement(bytes: &[u8]) -> Result<Announcement, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::MalformedAnnouncement(e.to_string()))?;
    versioned_object(&value)?;
    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedAnnouncement(e.to_string()))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn versioned_object(value: &Value) -> Result<&Map<String, Value>, ProtocolError> {
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    match obj.get("bac") {
        Some(v) if v.as_i64() == Some(PROTOCOL_VERSION) => Ok(obj),
        found => Err(ProtocolError::VersionMismatch {
            found: found.cloned(),
        }),
    }
}

/// A missing `args` field reads as `[]`.
fn args_of<'a>(
    obj: &'a Map<String, Value>,
    command: &'static str,
) -> Result<&'a [Value], ProtocolError> {
    match obj.get("args") {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(ProtocolError::InvalidArguments {
            command,
            reason: format!("args must be an array, got {other}"),
        }),
    }
}

fn expect_arity(
    command: &'static str,
    args: &[Value],
    expected: usize,
) -> Result<(), ProtocolError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::InvalidArguments {
            command,
            reason: format!("expected {expected} argument(s), got {}", args.len()),
        })
    }
}

fn encode_envelope(kind: &str, name: &str, args: Vec<Value>) -> Vec<u8> {
    let mut envelope = Map::new();
    envelope.insert("bac".to_string(), Value::from(PROTOCOL_VERSION));
    envelope.insert(kind.to_string(), Value::from(name));
    envelope.insert("args".to_string(), Value::Array(args));
    let mut bytes = Value::Object(envelope).to_string().into_bytes();
    bytes.push(b'\n');
    bytes
}

// ── Tests ─────────────────────────────────────────────────────────────────────
