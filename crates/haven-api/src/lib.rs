//! # haven-api
//!
//! HTTP layer for Haven: the client join endpoints, the public federation key
//! routes, and the adapters that connect the join core in `haven-rooms` to
//! PostgreSQL and the federation client.

pub mod auth;
pub mod middleware;
pub mod publisher;
pub mod routes;
pub mod services;

use std::{sync::Arc, time::Instant};

use axum::Router;
use haven_common::{ServerName, config::AppConfig};
use haven_db::Database;
use haven_federation::{FederationClient, KeyRing, RoomVersionId, ServerKeyPair};
use haven_rooms::JoinServices;

use crate::{
    publisher::RoomEventPublisher,
    services::{DbServices, KeyRingVerifier, RemoteServices},
};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Public server name used in federation (e.g. "haven.example.com").
    pub server_name: ServerName,
    /// Active Ed25519 signing key.
    pub federation_key: Arc<ServerKeyPair>,
    /// How long remote servers may cache our key document.
    pub key_validity: chrono::Duration,
    pub jwt_secret: String,
    /// Collaborators used by every join request.
    pub joins: JoinServices,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the join collaborators over the database and federation client.
    pub fn new(
        config: &AppConfig,
        db: Database,
        federation_key: Arc<ServerKeyPair>,
        federation_client: Arc<FederationClient>,
        key_ring: Arc<KeyRing>,
    ) -> Self {
        let server_name = ServerName::new(config.server.name.clone());

        let supported = config
            .federation
            .supported_room_versions
            .iter()
            .map(|v| RoomVersionId::new(v.clone()))
            .collect();
        let local = Arc::new(DbServices::new(db.pg.clone(), supported));
        let remote = Arc::new(RemoteServices::new(federation_client));

        let joins = JoinServices {
            server_name: server_name.clone(),
            key_pair: federation_key.clone(),
            remote_call_timeout: config.federation.remote_call_timeout(),
            invites: local.clone(),
            local_directory: local.clone(),
            remote_directory: remote.clone(),
            profiles: local.clone(),
            room_state: local,
            federation: remote,
            trust: Arc::new(KeyRingVerifier::new(key_ring)),
            publisher: Arc::new(RoomEventPublisher::new(db.pg.clone())),
        };

        Self {
            db,
            server_name,
            federation_key,
            key_validity: chrono::Duration::days(1),
            jwt_secret: config.auth.jwt_secret.clone(),
            joins,
            started_at: Instant::now(),
        }
    }
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .merge(routes::join::router(state.clone()))
        .merge(routes::federation::router())
        .merge(routes::health::router())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(state)
}
