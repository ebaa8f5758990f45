//! # haven-rooms
//!
//! Joining rooms by ID or alias.
//!
//! ```text
//!  join_room(target)
//!     │ parse: !room:server | #alias:server
//!     │ resolve alias (local directory / remote directory)
//!     │ candidates: inviters' servers, then the room ID's server
//!     ├─► join_locally ──► publish            (room known here)
//!     └─► for each candidate:                  (room absent)
//!           make_join ─► sign ─► send_join ─► verify ─► publish
//! ```
//!
//! Storage, federation transport, and key handling are reached through the
//! traits in [`capabilities`], so the orchestration is tested against fakes.

pub mod builder;
pub mod candidates;
pub mod capabilities;
pub mod context;
pub mod dispatcher;
pub mod federated;
pub mod local;
pub mod outcome;
pub mod target;

#[cfg(test)]
mod testing;

pub use capabilities::CapabilityError;
pub use context::{JoinRequest, JoinServices};
pub use dispatcher::join_room;
pub use outcome::{BadRequest, JoinError, JoinOutcome};
pub use target::RoomTarget;
