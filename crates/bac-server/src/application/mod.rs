//! Application layer use cases for the server.
//!
//! Nothing in here touches a socket.  The infrastructure layer frames and
//! decodes bytes, then hands the result to these modules.
//!
//! # Sub-modules
//!
//! - **`dispatch`** – Applies one decoded command to the slot roster and the
//!   issuing session, and produces the reply (if the command has one).
//!
//! - **`events`** – The events the event loop reports and the [`EventLog`]
//!   handle that receives them.
//!
//! [`EventLog`]: events::EventLog

pub mod dispatch;
pub mod events;
