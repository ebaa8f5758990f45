//! Server-to-server HTTP client.
//!
//! The [`FederationClient`] handles all outbound communication to remote
//! homeservers. Every request except the key fetch is signed with this
//! server's key pair before being sent.
//!
//! # Usage
//!
//! ```rust,no_run
//! use haven_federation::{FederationClient, ServerKeyPair};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> Result<(), haven_federation::FederationError> {
//! let kp = Arc::new(ServerKeyPair::generate());
//! let client = FederationClient::new(
//!     "haven.example.com",
//!     kp,
//!     Duration::from_secs(30),
//!     Duration::from_secs(5),
//! )?;
//! let alias = client.lookup_room_alias("example.org", "#foo:example.org").await?;
//! println!("{} lives on {:?}", alias.room_id, alias.servers);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    discovery::DiscoveryCache,
    error::FederationError,
    events::SignedEvent,
    keys::ServerKeyPair,
    room_version::RoomVersionId,
    signatures::sign_request,
    types::{MakeJoinResponse, RoomAliasResponse, SendJoinResponse},
};

// ─── Client ──────────────────────────────────────────────────────────────────

/// Async HTTP client for outbound server-to-server federation requests.
///
/// Internally uses `reqwest` with a connection pool and request signing.
pub struct FederationClient {
    server_name: String,
    key_pair: Arc<ServerKeyPair>,
    http: Client,
    discovery: DiscoveryCache,
}

impl FederationClient {
    /// Create a new federation client for the given `server_name`.
    pub fn new(
        server_name: impl Into<String>,
        key_pair: Arc<ServerKeyPair>,
        request_timeout: Duration,
        discovery_timeout: Duration,
    ) -> Result<Self, FederationError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("Haven-Federation/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            server_name: server_name.into(),
            key_pair,
            http,
            discovery: DiscoveryCache::new(discovery_timeout)?,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    // ── Join protocol ────────────────────────────────────────────────────────

    /// Request a join event template from a remote server, advertising the
    /// room versions we can handle.
    ///
    /// `GET /_matrix/federation/v1/make_join/{roomId}/{userId}?ver=…`
    pub async fn make_join(
        &self,
        destination: &str,
        room_id: &str,
        user_id: &str,
        supported_versions: &[RoomVersionId],
    ) -> Result<MakeJoinResponse, FederationError> {
        let mut uri = format!(
            "/_matrix/federation/v1/make_join/{}/{}",
            urlencoded(room_id),
            urlencoded(user_id)
        );
        let params: Vec<String> =
            supported_versions.iter().map(|v| format!("ver={}", urlencoded(v.as_str()))).collect();
        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }
        let base_url = self.discovery.resolve(destination).await?;
        self.signed_get(destination, &base_url, &uri).await
    }

    /// Submit a signed join event to a remote server.
    ///
    /// `PUT /_matrix/federation/v2/send_join/{roomId}/{eventId}`
    pub async fn send_join(
        &self,
        destination: &str,
        event: &SignedEvent,
    ) -> Result<SendJoinResponse, FederationError> {
        let room_id = event
            .pdu()
            .room_id()
            .ok_or_else(|| FederationError::MalformedEvent("join event has no room_id".into()))?;
        let uri = format!(
            "/_matrix/federation/v2/send_join/{}/{}",
            urlencoded(room_id),
            urlencoded(event.event_id())
        );
        let base_url = self.discovery.resolve(destination).await?;
        self.signed_put(destination, &base_url, &uri, &event.pdu().to_value()).await
    }

    // ── Directory ────────────────────────────────────────────────────────────

    /// Resolve a room alias on the server that owns it.
    ///
    /// `GET /_matrix/federation/v1/query/directory?room_alias=…`
    pub async fn lookup_room_alias(
        &self,
        destination: &str,
        room_alias: &str,
    ) -> Result<RoomAliasResponse, FederationError> {
        let uri = format!(
            "/_matrix/federation/v1/query/directory?room_alias={}",
            urlencoded(room_alias)
        );
        let base_url = self.discovery.resolve(destination).await?;
        self.signed_get(destination, &base_url, &uri).await
    }

    // ── Server keys ──────────────────────────────────────────────────────────

    /// Fetch the raw (still unverified) key document from a remote server.
    ///
    /// `GET /_matrix/key/v2/server`
    pub async fn fetch_server_keys(&self, destination: &str) -> Result<Value, FederationError> {
        let base_url = self.discovery.resolve(destination).await?;
        // Key fetch is unauthenticated.
        let url = format!("{}{}", base_url, "/_matrix/key/v2/server");
        debug!("Fetching server keys from {}", url);
        let resp = self.dispatch(destination, self.http.get(&url)).await?;
        read_json(destination, resp).await
    }

    // ── Signed request helpers ───────────────────────────────────────────────

    async fn signed_get<T: DeserializeOwned>(
        &self,
        destination: &str,
        base_url: &str,
        uri: &str,
    ) -> Result<T, FederationError> {
        let auth = sign_request(&self.key_pair, &self.server_name, destination, "GET", uri, None);
        let url = format!("{}{}", base_url, uri);
        debug!("Federation GET {}", url);
        let resp = self
            .dispatch(destination, self.http.get(&url).header("Authorization", auth.to_header()))
            .await?;
        read_json(destination, resp).await
    }

    async fn signed_put<T: DeserializeOwned>(
        &self,
        destination: &str,
        base_url: &str,
        uri: &str,
        body: &Value,
    ) -> Result<T, FederationError> {
        let auth =
            sign_request(&self.key_pair, &self.server_name, destination, "PUT", uri, Some(body));
        let url = format!("{}{}", base_url, uri);
        debug!("Federation PUT {}", url);
        let resp = self
            .dispatch(
                destination,
                self.http.put(&url).header("Authorization", auth.to_header()).json(body),
            )
            .await?;
        read_json(destination, resp).await
    }

    /// Send a request, forgetting the cached endpoint when the connection fails.
    async fn dispatch(
        &self,
        destination: &str,
        request: RequestBuilder,
    ) -> Result<Response, FederationError> {
        match request.send().await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                self.discovery.invalidate(destination).await;
                Err(e.into())
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn read_json<T: DeserializeOwned>(
    destination: &str,
    resp: Response,
) -> Result<T, FederationError> {
    match resp.status() {
        StatusCode::NOT_FOUND => Err(FederationError::RemoteNotFound(destination.to_owned())),
        status if !status.is_success() => {
            Err(FederationError::RemoteHttp(destination.to_owned(), format!("HTTP {}", status)))
        }
        _ => resp
            .json()
            .await
            .map_err(|e| FederationError::RemoteProtocol(destination.to_owned(), e.to_string())),
    }
}

fn urlencoded(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
