//! Middleware: access token extraction.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Uri, header},
    middleware::Next,
    response::Response,
};
use haven_common::{UserId, error::HavenError};
use tracing::debug;

use crate::{AppState, auth};

/// Authentication context extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
}

/// Validate the access token from `Authorization: Bearer <token>` (or the
/// legacy `access_token` query parameter) and attach an [`AuthContext`].
///
/// Tokens must name a user on this server.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, HavenError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
        .or_else(|| query_token(request.uri()))
        .ok_or(HavenError::MissingToken)?;

    let claims = auth::validate_token(&token, &state.jwt_secret).map_err(|e| {
        debug!("Rejected access token: {}", e);
        HavenError::UnknownToken
    })?;

    let user_id = UserId::parse(claims.sub).map_err(|_| HavenError::UnknownToken)?;
    if user_id.server_name() != state.server_name {
        return Err(HavenError::UnknownToken);
    }

    request.extensions_mut().insert(AuthContext { user_id });

    Ok(next.run(request).await)
}

fn query_token(uri: &Uri) -> Option<String> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "access_token")
        .map(|(_, v)| v.to_owned())
}
