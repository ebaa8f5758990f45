//! Collaborators the join core consumes.
//!
//! Each trait is object-safe and `Send + Sync` so one long-lived instance can
//! be shared by every concurrent join request behind an `Arc<dyn _>`.

use async_trait::async_trait;
use haven_common::{RoomAlias, RoomId, ServerName, UserId};
use haven_federation::{
    EventReference, MakeJoinResponse, RoomVersionId, SendJoinResponse, SignedEvent,
};
use thiserror::Error;

/// Failure reported by a capability.
///
/// `NotFound` is the typed "no such thing" answer (for example a remote
/// directory that does not know an alias); everything else is `Other`.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Display name and avatar copied into a membership event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    pub avatar_url: String,
}

/// Answer of a remote alias lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAlias {
    pub room_id: RoomId,
    pub servers: Vec<ServerName>,
}

/// Local event-graph data needed to place a new event in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub room_version: RoomVersionId,
    /// Current forward extremities.
    pub latest_events: Vec<EventReference>,
    /// Greatest depth among `latest_events`.
    pub max_depth: i64,
    /// Current state events that authorize the new event.
    pub auth_events: Vec<EventReference>,
}

#[async_trait]
pub trait InviteQuery: Send + Sync {
    /// Senders of the pending invites for `user_id` in `room_id`, oldest first.
    async fn inviters(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Vec<UserId>, CapabilityError>;
}

#[async_trait]
pub trait LocalDirectory: Send + Sync {
    async fn resolve_alias(&self, alias: &RoomAlias) -> Result<Option<RoomId>, CapabilityError>;
}

#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Ask `server` what `alias` points at; `CapabilityError::NotFound` when
    /// the remote side does not know it.
    async fn lookup_alias(
        &self,
        server: &ServerName,
        alias: &RoomAlias,
    ) -> Result<ResolvedAlias, CapabilityError>;
}

#[async_trait]
pub trait ProfileQuery: Send + Sync {
    /// Profile of a local user; users without a stored profile get the default.
    async fn profile(&self, user_id: &UserId) -> Result<Profile, CapabilityError>;
}

#[async_trait]
pub trait RoomStateQuery: Send + Sync {
    /// Room versions this server can participate in, oldest first.
    fn supported_room_versions(&self) -> Vec<RoomVersionId>;

    /// Snapshot of the room's event graph, or `None` when this server holds
    /// no state for it. `state_needed` lists the `(type, state_key)` pairs
    /// whose current events should be returned as auth events.
    async fn room_snapshot(
        &self,
        room_id: &RoomId,
        state_needed: &[(String, String)],
    ) -> Result<Option<RoomSnapshot>, CapabilityError>;
}

#[async_trait]
pub trait FederationApi: Send + Sync {
    async fn make_join(
        &self,
        server: &ServerName,
        room_id: &RoomId,
        user_id: &UserId,
        supported_versions: &[RoomVersionId],
    ) -> Result<MakeJoinResponse, CapabilityError>;

    /// Submit a signed join event; its room version travels with it.
    async fn send_join(
        &self,
        server: &ServerName,
        event: &SignedEvent,
    ) -> Result<SendJoinResponse, CapabilityError>;
}

#[async_trait]
pub trait TrustVerifier: Send + Sync {
    /// Check the signatures on a `send_join` answer and on the join event.
    /// May fetch remote keys.
    async fn verify_send_join(
        &self,
        response: &SendJoinResponse,
        event: &SignedEvent,
        room_id: &RoomId,
    ) -> Result<(), CapabilityError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Admit an accepted event into the local pipeline, together with the
    /// room state returned by the resident server for federated joins.
    async fn publish(
        &self,
        event: SignedEvent,
        state: Option<SendJoinResponse>,
    ) -> Result<(), CapabilityError>;
}
