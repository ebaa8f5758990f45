//! Federation wire types for the join handshake and directory queries.

use serde::{Deserialize, Serialize};

use crate::{
    events::{Pdu, ProtoEvent},
    room_version::RoomVersionId,
};

// ─── Join protocol ────────────────────────────────────────────────────────────

/// Payload returned by `GET /_matrix/federation/v1/make_join/{roomId}/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeJoinResponse {
    /// Absent on servers that predate room versions; treat as `"1"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_version: Option<RoomVersionId>,
    /// Template join event the joining server should fill in and sign.
    pub event: ProtoEvent,
}

/// Payload returned by `PUT /_matrix/federation/v2/send_join/{roomId}/{eventId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendJoinResponse {
    /// Name of the resident server that answered.
    #[serde(default)]
    pub origin: String,
    /// Current room state snapshot at the join point.
    #[serde(default)]
    pub state: Vec<Pdu>,
    /// Auth chain (events needed to validate the state).
    #[serde(default)]
    pub auth_chain: Vec<Pdu>,
}

// ─── Directory ────────────────────────────────────────────────────────────────

/// Payload returned by `GET /_matrix/federation/v1/query/directory?room_alias=…`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAliasResponse {
    pub room_id: String,
    /// Servers believed to be in the room, most useful first.
    #[serde(default)]
    pub servers: Vec<String>,
}

// ─── Well-known response ──────────────────────────────────────────────────────

/// Response shape for `/.well-known/matrix/server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellKnownServer {
    /// The delegated server name (may differ from the queried hostname for delegation).
    #[serde(rename = "m.server")]
    pub server: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn make_join_without_version_parses() {
        let resp: MakeJoinResponse = serde_json::from_value(json!({
            "event": {
                "type": "m.room.member",
                "room_id": "!abc:example.org",
                "sender": "@alice:haven.example.com",
                "state_key": "@alice:haven.example.com",
                "content": {"membership": "join"},
                "prev_events": ["$p"],
                "auth_events": ["$a"],
                "depth": 12,
                "origin": "example.org",
                "origin_server_ts": 5
            }
        }))
        .unwrap();
        assert!(resp.room_version.is_none());
        assert_eq!(resp.event.depth, 12);
    }
}
