//! Federation event shapes: templates, persistent data units, and signing.
//!
//! A join starts from a [`ProtoEvent`] (an unsigned template, either assembled
//! locally or returned by a remote `make_join`). [`ProtoEvent::build`] binds
//! the origin, timestamp, and room version, computes the content hash,
//! derives the event ID, and signs the redacted form, producing a
//! [`SignedEvent`] that is never mutated again.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::FederationError,
    keys::ServerKeyPair,
    room_version::{EventFormat, EventIdFormat, RoomVersionId, RoomVersionRules},
    signatures::{canonical_json, sign_json_object},
};

/// Event type of membership events.
pub const MEMBER_EVENT_TYPE: &str = "m.room.member";

// ─── Templates ───────────────────────────────────────────────────────────────

/// An unsigned event template.
///
/// `prev_events` and `auth_events` are kept as raw JSON because their shape
/// depends on the room version's [`EventFormat`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtoEvent {
    pub sender: String,
    pub room_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub prev_events: Value,
    #[serde(default)]
    pub auth_events: Value,
    #[serde(default)]
    pub depth: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
}

impl ProtoEvent {
    /// Finalize and sign the template.
    ///
    /// Fails with [`FederationError::UnsupportedRoomVersion`] when the
    /// version's event format is unknown.
    pub fn build(
        &self,
        origin_server_ts: i64,
        origin: &str,
        key: &ServerKeyPair,
        room_version: &RoomVersionId,
    ) -> Result<SignedEvent, FederationError> {
        let rules = room_version.rules()?;

        let mut value = serde_json::to_value(self)?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| {
                FederationError::MalformedEvent("template must be a JSON object".into())
            })?;
        obj.insert("origin".into(), Value::String(origin.to_owned()));
        obj.insert("origin_server_ts".into(), json!(origin_server_ts));
        for field in ["prev_events", "auth_events"] {
            if obj.get(field).is_none_or(Value::is_null) {
                obj.insert(field.into(), Value::Array(Vec::new()));
            }
        }
        if !obj.get("content").is_some_and(Value::is_object) {
            obj.insert("content".into(), Value::Object(Map::new()));
        }
        if rules.event_id_format == EventIdFormat::Random {
            obj.insert("event_id".into(), Value::String(new_event_id(origin)));
        }

        let hash = content_hash(&value)?;
        value["hashes"] = json!({ "sha256": hash });

        let sig = sign_json_object(key, &redact(&value, &rules))?;
        value["signatures"] = json!({ origin: { key.key_id.as_str(): sig } });

        let pdu = Pdu::from_value(value)?;
        let event_id = pdu.event_id(&rules)?;
        Ok(SignedEvent { event_id, room_version: room_version.clone(), pdu })
    }
}

/// A reference to an earlier event, for `prev_events` / `auth_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReference {
    pub event_id: String,
    /// Content hash of the referenced event; only v1-format rooms use it.
    pub sha256: Option<String>,
}

impl EventFormat {
    /// Render references in the shape this format expects.
    pub fn references(self, refs: &[EventReference]) -> Value {
        match self {
            EventFormat::V1 => Value::Array(
                refs.iter()
                    .map(|r| {
                        json!([r.event_id, { "sha256": r.sha256.clone().unwrap_or_default() }])
                    })
                    .collect(),
            ),
            EventFormat::V2 => Value::Array(refs.iter().map(|r| json!(r.event_id)).collect()),
        }
    }
}

// ─── PDUs ────────────────────────────────────────────────────────────────────

/// A persistent data unit as exchanged over federation.
///
/// Kept as the raw JSON object: signatures and hashes cover every key, so
/// nothing may be dropped by a round-trip through a typed struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pdu(Map<String, Value>);

impl Pdu {
    pub fn from_value(value: Value) -> Result<Self, FederationError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(FederationError::MalformedEvent("PDU must be a JSON object".into())),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn room_id(&self) -> Option<&str> {
        self.str_field("room_id")
    }

    pub fn sender(&self) -> Option<&str> {
        self.str_field("sender")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    pub fn state_key(&self) -> Option<&str> {
        self.str_field("state_key")
    }

    pub fn content(&self) -> Option<&Value> {
        self.0.get("content")
    }

    pub fn depth(&self) -> i64 {
        self.0.get("depth").and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn origin_server_ts(&self) -> i64 {
        self.0.get("origin_server_ts").and_then(Value::as_i64).unwrap_or_default()
    }

    /// `signatures.<server>` as `(key_id, signature)` pairs.
    pub fn signatures_for(&self, server: &str) -> Vec<(&str, &str)> {
        self.0
            .get("signatures")
            .and_then(|s| s.get(server))
            .and_then(Value::as_object)
            .map(|sigs| sigs.iter().filter_map(|(k, v)| Some((k.as_str(), v.as_str()?))).collect())
            .unwrap_or_default()
    }

    /// IDs of the events this one points at, whichever format it uses.
    pub fn prev_event_ids(&self) -> Vec<String> {
        self.0
            .get("prev_events")
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| match r {
                        Value::String(id) => Some(id.clone()),
                        Value::Array(pair) => {
                            pair.first().and_then(Value::as_str).map(str::to_owned)
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The event ID: carried in the event for v1-format rooms, otherwise
    /// derived from the reference hash.
    pub fn event_id(&self, rules: &RoomVersionRules) -> Result<String, FederationError> {
        match rules.event_id_format {
            EventIdFormat::Random => self
                .str_field("event_id")
                .map(str::to_owned)
                .ok_or_else(|| FederationError::MalformedEvent("missing event_id".into())),
            EventIdFormat::ReferenceHash => {
                let hash = reference_hash(&self.to_value(), rules)?;
                Ok(format!("${}", STANDARD_NO_PAD.encode(hash)))
            }
            EventIdFormat::UrlSafeReferenceHash => {
                let hash = reference_hash(&self.to_value(), rules)?;
                Ok(format!("${}", URL_SAFE_NO_PAD.encode(hash)))
            }
        }
    }

    /// The redacted form that event signatures cover.
    pub fn redacted(&self, rules: &RoomVersionRules) -> Value {
        redact(&self.to_value(), rules)
    }
}

/// An event finalized and signed by this server.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedEvent {
    event_id: String,
    room_version: RoomVersionId,
    pdu: Pdu,
}

impl SignedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn room_version(&self) -> &RoomVersionId {
        &self.room_version
    }

    pub fn pdu(&self) -> &Pdu {
        &self.pdu
    }
}

// ─── Hashing and redaction ───────────────────────────────────────────────────

/// Generate a new locally-unique event ID on this server (v1/v2 rooms).
pub fn new_event_id(server_name: &str) -> String {
    let id = URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
    format!("${}:{}", id, server_name)
}

/// `hashes.sha256`: SHA-256 over the event minus `unsigned`, `signatures`, `hashes`.
pub fn content_hash(event: &Value) -> Result<String, FederationError> {
    let mut obj = event
        .as_object()
        .cloned()
        .ok_or_else(|| FederationError::MalformedEvent("event must be a JSON object".into()))?;
    for key in ["unsigned", "signatures", "hashes"] {
        obj.remove(key);
    }
    let digest = Sha256::digest(canonical_json(&Value::Object(obj))?.as_bytes());
    Ok(STANDARD_NO_PAD.encode(digest))
}

/// SHA-256 over the redacted event minus `signatures`, `unsigned`, `age_ts`.
fn reference_hash(event: &Value, rules: &RoomVersionRules) -> Result<Vec<u8>, FederationError> {
    let mut redacted = redact(event, rules);
    if let Some(obj) = redacted.as_object_mut() {
        for key in ["signatures", "unsigned", "age_ts"] {
            obj.remove(key);
        }
    }
    Ok(Sha256::digest(canonical_json(&redacted)?.as_bytes()).to_vec())
}

const PRESERVED_KEYS: [&str; 15] = [
    "event_id", "type", "room_id", "sender", "state_key", "content", "hashes", "signatures",
    "depth", "prev_events", "prev_state", "auth_events", "origin", "origin_server_ts", "membership",
];

fn preserved_content_keys(event_type: &str, rules: &RoomVersionRules) -> &'static [&'static str] {
    match event_type {
        MEMBER_EVENT_TYPE => &["membership"],
        "m.room.create" => &["creator"],
        "m.room.join_rules" => &["join_rule"],
        "m.room.power_levels" => &[
            "ban",
            "events",
            "events_default",
            "kick",
            "redact",
            "state_default",
            "users",
            "users_default",
        ],
        "m.room.history_visibility" => &["history_visibility"],
        "m.room.aliases" if rules.special_case_aliases => &["aliases"],
        _ => &[],
    }
}

/// Strip an event down to the keys that survive redaction.
pub fn redact(event: &Value, rules: &RoomVersionRules) -> Value {
    let Some(obj) = event.as_object() else {
        return event.clone();
    };
    let event_type = obj.get("type").and_then(Value::as_str).unwrap_or_default();
    let keep_content = preserved_content_keys(event_type, rules);

    let mut out = Map::new();
    for (key, value) in obj {
        if !PRESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if key == "content" {
            let content: Map<String, Value> = value
                .as_object()
                .map(|c| {
                    c.iter()
                        .filter(|(k, _)| keep_content.contains(&k.as_str()))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default();
            out.insert(key.clone(), Value::Object(content));
        } else {
            out.insert(key.clone(), value.clone());
        }
    }
    Value::Object(out)
}
