//! Public federation discovery routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET    | `/_matrix/key/v2/server` | This server's self-signed key document |
//! | GET    | `/.well-known/matrix/server` | Delegation to the federation endpoint |

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use haven_common::error::{HavenError, HavenResult};
use haven_federation::{ServerKeyDocument, WellKnownServer};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/_matrix/key/v2/server", get(server_key_document))
        .route("/.well-known/matrix/server", get(well_known_server))
}

/// `GET /_matrix/key/v2/server`
///
/// Remote servers fetch this to verify the signatures on our join events.
async fn server_key_document(
    State(state): State<Arc<AppState>>,
) -> HavenResult<Json<ServerKeyDocument>> {
    let doc = state
        .federation_key
        .to_key_document(state.server_name.as_str(), state.key_validity)
        .map_err(|e| HavenError::Internal(e.into()))?;
    Ok(Json(doc))
}

/// `GET /.well-known/matrix/server`
///
/// Delegates to `server.name` on the configured port unless the name already
/// carries one.
async fn well_known_server() -> Json<WellKnownServer> {
    let server = &haven_common::config::get().server;
    Json(WellKnownServer { server: delegated_endpoint(&server.name, server.port) })
}

fn delegated_endpoint(name: &str, port: u16) -> String {
    if name.contains(':') { name.to_owned() } else { format!("{}:{}", name, port) }
}

#[cfg(test)]
mod tests {
    use super::delegated_endpoint;

    #[test]
    fn explicit_port_is_kept() {
        assert_eq!(delegated_endpoint("haven.example.com", 8448), "haven.example.com:8448");
        assert_eq!(delegated_endpoint("haven.example.com:443", 8448), "haven.example.com:443");
    }
}
