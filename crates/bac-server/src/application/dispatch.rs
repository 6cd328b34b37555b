//! DispatchCommand: applies one decoded client command to the slot state.
//!
//! This use case is the heart of the server.  It receives a [`Command`] that
//! a session has already framed and decoded, mutates the [`SlotRoster`] and
//! the session's own [`SessionSlots`], and says what (if anything) should be
//! written back to the client.
//!
//! | Command              | Effect                                    | Reply            |
//! |----------------------|-------------------------------------------|------------------|
//! | `get_slots`          | none                                      | slot statuses    |
//! | `request_slot [i]`   | grant iff slot free and requester idle    | `1` / `0`        |
//! | `relinquish_slot`    | release held slot, if any                 | none             |
//! | `update_peripherals` | store recognized values while holding     | none             |
//!
//! No sockets here: the caller owns the transport and performs the write.

use bac_core::{Command, Reply, SessionSlots, SlotRoster};

/// Executes `command` on behalf of `session`.
///
/// Returns the reply to send, or `None` for commands that have no reply.
pub fn dispatch(roster: &mut SlotRoster, session: &mut SessionSlots, command: Command) -> Option<Reply> {
    match command {
        Command::GetSlots => Some(Reply::GetSlots(roster.statuses())),
        Command::RequestSlot { slot } => Some(Reply::RequestSlot {
            granted: roster.request(session, slot),
        }),
        Command::RelinquishSlot => {
            roster.relinquish(session);
            None
        }
        Command::UpdatePeripherals(update) => {
            if session.held().is_some() {
                session.peripherals.apply(&update);
            }
            None
        }
    }
}
