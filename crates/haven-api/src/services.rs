//! Join capabilities backed by PostgreSQL and the federation client.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use haven_common::{RoomAlias, RoomId, ServerName, UserId};
use haven_db::repository::{aliases, invites, profiles, rooms};
use haven_federation::{
    EventReference, FederationClient, FederationError, KeyRing, MakeJoinResponse, RoomVersionId,
    SendJoinResponse, SignedEvent,
};
use haven_rooms::capabilities::{
    CapabilityError, FederationApi, InviteQuery, LocalDirectory, Profile, ProfileQuery,
    RemoteDirectory, ResolvedAlias, RoomSnapshot, RoomStateQuery, TrustVerifier,
};
use sqlx::PgPool;

fn db_error(e: sqlx::Error) -> CapabilityError {
    CapabilityError::Other(e.into())
}

fn federation_error(e: FederationError) -> CapabilityError {
    match e {
        FederationError::RemoteNotFound(_) => CapabilityError::NotFound,
        other => CapabilityError::Other(other.into()),
    }
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> CapabilityError {
    CapabilityError::Other(anyhow!("stored {}: {}", what, e))
}

// ─── Database ────────────────────────────────────────────────────────────────

/// Invites, local aliases, profiles, and room state from PostgreSQL.
#[derive(Clone)]
pub struct DbServices {
    pool: PgPool,
    supported_room_versions: Vec<RoomVersionId>,
}

impl DbServices {
    pub fn new(pool: PgPool, supported_room_versions: Vec<RoomVersionId>) -> Self {
        Self { pool, supported_room_versions }
    }
}

#[async_trait]
impl InviteQuery for DbServices {
    async fn inviters(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Vec<UserId>, CapabilityError> {
        invites::inviter_ids(&self.pool, room_id.as_str(), user_id.as_str())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|id| UserId::parse(id).map_err(|e| corrupt("inviter", e)))
            .collect()
    }
}

#[async_trait]
impl LocalDirectory for DbServices {
    async fn resolve_alias(&self, alias: &RoomAlias) -> Result<Option<RoomId>, CapabilityError> {
        aliases::room_id_for_alias(&self.pool, alias.as_str())
            .await
            .map_err(db_error)?
            .map(|id| RoomId::parse(id).map_err(|e| corrupt("alias target", e)))
            .transpose()
    }
}

#[async_trait]
impl ProfileQuery for DbServices {
    async fn profile(&self, user_id: &UserId) -> Result<Profile, CapabilityError> {
        let stored = profiles::find_by_localpart(&self.pool, user_id.localpart())
            .await
            .map_err(db_error)?;
        Ok(stored
            .map(|p| Profile {
                display_name: p.display_name.unwrap_or_default(),
                avatar_url: p.avatar_url.unwrap_or_default(),
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RoomStateQuery for DbServices {
    fn supported_room_versions(&self) -> Vec<RoomVersionId> {
        self.supported_room_versions.clone()
    }

    async fn room_snapshot(
        &self,
        room_id: &RoomId,
        state_needed: &[(String, String)],
    ) -> Result<Option<RoomSnapshot>, CapabilityError> {
        let room = room_id.as_str();
        let Some(version) = rooms::room_version(&self.pool, room).await.map_err(db_error)? else {
            return Ok(None);
        };
        let latest = rooms::latest_events(&self.pool, room).await.map_err(db_error)?;
        // A room row without events means we only ever saw it as an outlier.
        if latest.is_empty() {
            return Ok(None);
        }
        let state = rooms::state_refs(&self.pool, room, state_needed).await.map_err(db_error)?;

        Ok(Some(RoomSnapshot {
            room_version: RoomVersionId::new(version),
            max_depth: latest.iter().map(|e| e.depth).max().unwrap_or_default(),
            latest_events: latest
                .into_iter()
                .map(|e| EventReference { event_id: e.event_id, sha256: e.sha256 })
                .collect(),
            auth_events: state
                .into_iter()
                .map(|s| EventReference { event_id: s.event_id, sha256: s.sha256 })
                .collect(),
        }))
    }
}

// ─── Federation ──────────────────────────────────────────────────────────────

/// `make_join`, `send_join`, and directory lookups over the signed S2S client.
#[derive(Clone)]
pub struct RemoteServices {
    client: Arc<FederationClient>,
}

impl RemoteServices {
    pub fn new(client: Arc<FederationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FederationApi for RemoteServices {
    async fn make_join(
        &self,
        server: &ServerName,
        room_id: &RoomId,
        user_id: &UserId,
        supported_versions: &[RoomVersionId],
    ) -> Result<MakeJoinResponse, CapabilityError> {
        self.client
            .make_join(server.as_str(), room_id.as_str(), user_id.as_str(), supported_versions)
            .await
            .map_err(federation_error)
    }

    async fn send_join(
        &self,
        server: &ServerName,
        event: &SignedEvent,
    ) -> Result<SendJoinResponse, CapabilityError> {
        self.client.send_join(server.as_str(), event).await.map_err(federation_error)
    }
}

#[async_trait]
impl RemoteDirectory for RemoteServices {
    async fn lookup_alias(
        &self,
        server: &ServerName,
        alias: &RoomAlias,
    ) -> Result<ResolvedAlias, CapabilityError> {
        let resp = self
            .client
            .lookup_room_alias(server.as_str(), alias.as_str())
            .await
            .map_err(federation_error)?;
        let room_id = RoomId::parse(resp.room_id).map_err(|e| {
            CapabilityError::Other(anyhow!("{} returned a bad room ID: {}", server, e))
        })?;
        Ok(ResolvedAlias {
            room_id,
            servers: resp.servers.into_iter().map(ServerName::new).collect(),
        })
    }
}

// ─── Trust ───────────────────────────────────────────────────────────────────

/// Signature checks over `send_join` answers using the shared key ring.
pub struct KeyRingVerifier {
    ring: Arc<KeyRing>,
}

impl KeyRingVerifier {
    pub fn new(ring: Arc<KeyRing>) -> Self {
        Self { ring }
    }
}

#[async_trait]
impl TrustVerifier for KeyRingVerifier {
    async fn verify_send_join(
        &self,
        response: &SendJoinResponse,
        event: &SignedEvent,
        room_id: &RoomId,
    ) -> Result<(), CapabilityError> {
        self.ring
            .check_send_join(response, event, room_id.as_str())
            .await
            .map_err(|e| CapabilityError::Other(e.into()))
    }
}
