//! What a join request can end in.

use haven_common::RoomId;
use thiserror::Error;

/// Client-correctable reasons for rejecting a join.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BadRequest {
    #[error("Invalid first character '{0}' for room ID or alias")]
    InvalidTarget(char),

    #[error("Room ID or alias must not be empty")]
    EmptyTarget,

    #[error("Room alias must be in the form '#localpart:domain'")]
    MalformedAlias,

    #[error("Room ID must be in the form '!opaque:domain'")]
    MalformedRoomId,

    #[error("Room version '{0}' is not supported")]
    UnsupportedRoomVersion(String),
}

/// Why a join did not succeed.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error(transparent)]
    BadRequest(#[from] BadRequest),

    #[error("{0}")]
    NotFound(String),

    /// Every remote attempt failed; carries the last cause.
    #[error("failed to join through any server: {0}")]
    Upstream(#[source] anyhow::Error),

    /// A local step failed with no recovery path.
    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

/// `Ok` with the joined room's ID.
pub type JoinOutcome = Result<RoomId, JoinError>;
