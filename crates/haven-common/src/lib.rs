//! # haven-common
//!
//! Shared configuration, error handling, and identifier parsing used across all
//! Haven crates. This is the foundation layer: no protocol logic, just
//! primitives and contracts.

pub mod config;
pub mod error;
pub mod identifiers;

pub use identifiers::{IdError, RoomAlias, RoomId, ServerName, UserId};
