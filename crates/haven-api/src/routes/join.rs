//! Client join endpoints.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST   | `/_matrix/client/r0/join/{roomIdOrAlias}` | Join by room ID or alias |
//! | POST   | `/_matrix/client/r0/rooms/{roomId}/join` | Join by room ID |

use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    middleware,
    routing::post,
};
use chrono::Utc;
use haven_common::error::{HavenError, HavenResult};
use haven_rooms::{BadRequest, JoinError, JoinRequest, join_room};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{AppState, middleware::AuthContext};

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/_matrix/client/r0/join/{room_id_or_alias}", post(join_by_id_or_alias))
        .route("/_matrix/client/r0/rooms/{room_id}/join", post(join_by_room_id))
        .route_layer(middleware::from_fn_with_state(state, crate::middleware::auth_middleware))
}

#[derive(Debug, Serialize)]
struct JoinResponse {
    room_id: String,
}

/// POST /_matrix/client/r0/join/{roomIdOrAlias}
async fn join_by_id_or_alias(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> HavenResult<Json<JoinResponse>> {
    join(&state, auth, &target, &params, &body).await
}

/// POST /_matrix/client/r0/rooms/{roomId}/join
async fn join_by_room_id(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> HavenResult<Json<JoinResponse>> {
    require_room_id(&room_id)?;
    join(&state, auth, &room_id, &params, &body).await
}

async fn join(
    state: &AppState,
    auth: AuthContext,
    target: &str,
    params: &HashMap<String, String>,
    body: &[u8],
) -> HavenResult<Json<JoinResponse>> {
    let request = JoinRequest {
        user_id: auth.user_id,
        content: parse_content(body)?,
        origin_server_ts: parse_ts(params.get("ts").map(String::as_str))?,
    };
    debug!(user_id = %request.user_id, target = %target, "Join requested");

    let room_id = join_room(&state.joins, target, &request).await.map_err(into_haven_error)?;
    Ok(Json(JoinResponse { room_id: room_id.to_string() }))
}

/// This path names a room directly, so aliases are turned away here.
fn require_room_id(target: &str) -> HavenResult<()> {
    if target.starts_with('!') {
        Ok(())
    } else {
        Err(HavenError::bad_json(format!("{} is not a room ID", target)))
    }
}

/// The body must be a JSON object; an empty body counts as `{}`.
fn parse_content(body: &[u8]) -> HavenResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(HavenError::bad_json("Content must be a JSON object")),
        Err(e) => Err(HavenError::bad_json(format!(
            "The request body could not be decoded into JSON: {}",
            e
        ))),
    }
}

/// `ts` overrides the event timestamp (milliseconds since the epoch).
fn parse_ts(ts: Option<&str>) -> HavenResult<i64> {
    match ts {
        None => Ok(Utc::now().timestamp_millis()),
        Some(raw) => raw.parse::<i64>().map_err(|e| HavenError::InvalidParam {
            message: format!("ts: {}", e),
        }),
    }
}

fn into_haven_error(err: JoinError) -> HavenError {
    match err {
        JoinError::BadRequest(reason @ BadRequest::UnsupportedRoomVersion(_)) => {
            HavenError::UnsupportedRoomVersion { message: reason.to_string() }
        }
        JoinError::BadRequest(reason) => HavenError::bad_json(reason.to_string()),
        JoinError::NotFound(message) => HavenError::not_found(message),
        JoinError::Upstream(e) | JoinError::Internal(e) => HavenError::Internal(e),
    }
}
