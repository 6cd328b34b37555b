//! Slot roster and the per-session half of the slot assignment.
//!
//! A **slot** is a named input channel ("Player 1") that at most one
//! session may hold at a time.  A **session** holds at most one slot.  The
//! pairing is stored as two independent handles rather than mutual
//! references:
//!
//! ```text
//! SlotRoster.slots[i].occupant ──► Option<SessionId>
//! SessionSlots.held            ──► Option<SlotIndex>
//! ```
//!
//! Both sides are only ever changed together, by [`SlotRoster::request`] and
//! [`SlotRoster::relinquish`].  Relinquish checks identity before clearing the
//! slot side, so a stale `held` handle can never evict a different occupant.
//!
//! # State machine
//!
//! ```text
//!            request (slot free AND requester holds none)
//!   Free  ───────────────────────────────────────────────►  Held(session)
//!         ◄───────────────────────────────────────────────
//!            relinquish  |  session destroyed
//! ```
//!
//! Slots are never destroyed while serving; the roster is fixed before the
//! first client connects.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::protocol::messages::{SlotStatus, RECOGNIZED_PERIPHERALS};

/// Position of a slot in the roster.  Stable for the lifetime of a run.
pub type SlotIndex = usize;

/// Identity of one connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Peripherals ───────────────────────────────────────────────────────────────

/// Last-reported peripheral values of one session.
///
/// Only names in the recognized set are stored; a name reads as `None` until
/// the session first reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct Peripherals {
    values: BTreeMap<String, Option<Value>>,
}

impl Peripherals {
    /// Creates an empty record over the given recognized names.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }

    /// Overwrites every recognized key present in `update`.
    ///
    /// Returns how many values were written; unknown keys are ignored.
    pub fn apply(&mut self, update: &Map<String, Value>) -> usize {
        let mut written = 0;
        for (name, value) in update {
            if let Some(slot) = self.values.get_mut(name) {
                *slot = Some(value.clone());
                written += 1;
            }
        }
        written
    }

    /// Returns the last value reported for `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(Option::as_ref)
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::with_names(RECOGNIZED_PERIPHERALS.iter().copied())
    }
}

// ── Session side ──────────────────────────────────────────────────────────────

/// Slot-related state owned by one session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSlots {
    id: SessionId,
    held: Option<SlotIndex>,
    /// Values reported through `update_peripherals`.
    pub peripherals: Peripherals,
}

impl SessionSlots {
    /// Creates state for a new session that holds no slot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The slot currently held, if any.
    pub fn held(&self) -> Option<SlotIndex> {
        self.held
    }
}

// ── Roster ────────────────────────────────────────────────────────────────────

/// One named slot and its current occupant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    occupant: Option<SessionId>,
}

impl Slot {
    fn new(name: String) -> Self {
        Self {
            name,
            occupant: None,
        }
    }

    pub fn occupant(&self) -> Option<SessionId> {
        self.occupant
    }

    pub fn is_available(&self) -> bool {
        self.occupant.is_none()
    }
}

/// The ordered, fixed set of slots offered by a server.
#[derive(Debug, Clone, Default)]
pub struct SlotRoster {
    slots: Vec<Slot>,
}

impl SlotRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot and returns its index.
    ///
    /// Call before serving begins; indices must not shift while clients hold
    /// them.
    pub fn add_slot(&mut self, name: impl Into<String>) -> SlotIndex {
        self.slots.push(Slot::new(name.into()));
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: SlotIndex) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// The session holding slot `index`, if any.
    pub fn occupant(&self, index: SlotIndex) -> Option<SessionId> {
        self.slots.get(index).and_then(Slot::occupant)
    }

    /// Grants slot `index` to `session` iff the slot exists, is free, and the
    /// session holds no slot.  On `false` nothing changes.
    pub fn request(&mut self, session: &mut SessionSlots, index: SlotIndex) -> bool {
        if session.held.is_some() {
            return false;
        }
        match self.slots.get_mut(index) {
            Some(slot) if slot.occupant.is_none() => {
                slot.occupant = Some(session.id);
                session.held = Some(index);
                debug!("slot {index} granted to session {}", session.id);
                true
            }
            _ => false,
        }
    }

    /// Releases whatever slot `session` holds.  Idempotent.
    ///
    /// The slot's occupant is cleared only if it is still `session`; the
    /// session's handle is cleared unconditionally.
    pub fn relinquish(&mut self, session: &mut SessionSlots) -> Option<SlotIndex> {
        let index = session.held.take()?;
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.occupant == Some(session.id) {
                slot.occupant = None;
                debug!("slot {index} released by session {}", session.id);
            }
        }
        Some(index)
    }

    /// Snapshot of every slot in roster order, as sent by `get_slots`.
    pub fn statuses(&self) -> Vec<SlotStatus> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| SlotStatus {
                slot: i,
                name: s.name.clone(),
                available: s.is_available(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
