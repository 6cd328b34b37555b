//! Domain entities for bac.
//!
//! Pure business rules with no I/O: the slot roster and the exclusive,
//! revocable pairing between slots and sessions.  Everything here can be
//! tested without a socket.

/// Slot roster and per-session slot state.
///
/// See [`slots::SlotRoster`] for the main type.
pub mod slots;
