//! Per-request input and the long-lived collaborators a join runs against.

use std::{future::Future, sync::Arc, time::Duration};

use haven_common::{ServerName, UserId};
use haven_federation::ServerKeyPair;
use serde_json::{Map, Value};

use crate::capabilities::{
    EventPublisher, FederationApi, InviteQuery, LocalDirectory, ProfileQuery, RemoteDirectory,
    RoomStateQuery, TrustVerifier,
};

/// One join request. Immutable once built.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub user_id: UserId,
    /// Client-supplied content merged into the membership event.
    pub content: Map<String, Value>,
    /// Milliseconds since the epoch; bound into every event built for this request.
    pub origin_server_ts: i64,
}

/// Collaborators shared by every join request, owned by the process.
#[derive(Clone)]
pub struct JoinServices {
    pub server_name: ServerName,
    pub key_pair: Arc<ServerKeyPair>,
    /// Upper bound on each remote call (lookup, make_join, send_join, verification).
    pub remote_call_timeout: Duration,
    pub invites: Arc<dyn InviteQuery>,
    pub local_directory: Arc<dyn LocalDirectory>,
    pub remote_directory: Arc<dyn RemoteDirectory>,
    pub profiles: Arc<dyn ProfileQuery>,
    pub room_state: Arc<dyn RoomStateQuery>,
    pub federation: Arc<dyn FederationApi>,
    pub trust: Arc<dyn TrustVerifier>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// Marker error for a remote call that outlived `remote_call_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut;

impl JoinServices {
    /// Run a remote call under the configured deadline. Dropping the future
    /// on expiry aborts the in-flight request.
    pub async fn bounded<F: Future>(&self, call: F) -> Result<F::Output, TimedOut> {
        tokio::time::timeout(self.remote_call_timeout, call).await.map_err(|_| TimedOut)
    }
}
