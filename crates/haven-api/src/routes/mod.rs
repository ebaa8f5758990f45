//! Route modules.

pub mod federation;
pub mod health;
pub mod join;
