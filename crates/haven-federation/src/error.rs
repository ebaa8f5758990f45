//! Federation error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FederationError {
    // ── Signing keys ─────────────────────────────────────────────────────────

    #[error("Server '{server}' publishes no key '{key_id}'")]
    UnknownKey { server: String, key_id: String },

    #[error("Signing key seed must be exactly 32 bytes")]
    InvalidSeed,

    #[error("Stored signing key '{stored}' does not match its seed (derives '{derived}')")]
    StoredKeyMismatch { stored: String, derived: String },

    #[error("Key storage error: {0}")]
    Storage(#[from] sqlx::Error),

    // ── Signatures ───────────────────────────────────────────────────────────

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Event from '{0}' carries no signature we can check")]
    MissingSignature(String),

    // ── Events ───────────────────────────────────────────────────────────────

    #[error("Room version '{0}' is not supported")]
    UnsupportedRoomVersion(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    // ── Remote servers ───────────────────────────────────────────────────────

    #[error("Failed to resolve server '{0}': {1}")]
    DiscoveryFailed(String, String),

    #[error("HTTP error communicating with remote server '{0}': {1}")]
    RemoteHttp(String, String),

    #[error("Remote server '{0}' has no such resource")]
    RemoteNotFound(String),

    #[error("Remote server '{0}' returned an unexpected response: {1}")]
    RemoteProtocol(String, String),
}

impl From<reqwest::Error> for FederationError {
    fn from(e: reqwest::Error) -> Self {
        let server = e.url().and_then(|u| u.host_str()).unwrap_or("?").to_owned();
        FederationError::RemoteHttp(server, e.to_string())
    }
}
