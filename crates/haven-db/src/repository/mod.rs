//! Repository layer: query functions organized by domain.

pub mod aliases;
pub mod invites;
pub mod profiles;
pub mod rooms;
