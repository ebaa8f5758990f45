//! Room versions and the event-format rules each one selects.
//!
//! A room version is an opaque string negotiated during a join. This server
//! only knows how to build and check events for the versions listed in
//! [`KNOWN_ROOM_VERSIONS`]; anything else is rejected before an event is
//! signed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FederationError;

/// Shape of `prev_events` / `auth_events` and whether events carry their ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFormat {
    /// `event_id` is part of the event; references are `[id, {"sha256": …}]` pairs.
    V1,
    /// No `event_id` field; references are bare event IDs.
    V2,
}

/// How event IDs are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventIdFormat {
    /// `$<random>:<origin>`, chosen by the sender.
    Random,
    /// `$` + standard base64 of the reference hash.
    ReferenceHash,
    /// `$` + url-safe base64 of the reference hash.
    UrlSafeReferenceHash,
}

/// Rules in effect for one room version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomVersionRules {
    pub event_format: EventFormat,
    pub event_id_format: EventIdFormat,
    /// Whether `m.room.aliases` keeps its `aliases` key under redaction.
    pub special_case_aliases: bool,
}

/// Every room version whose rules this server implements, oldest first.
pub const KNOWN_ROOM_VERSIONS: [(&str, RoomVersionRules); 6] = [
    ("1", rules(EventFormat::V1, EventIdFormat::Random, true)),
    ("2", rules(EventFormat::V1, EventIdFormat::Random, true)),
    ("3", rules(EventFormat::V2, EventIdFormat::ReferenceHash, true)),
    ("4", rules(EventFormat::V2, EventIdFormat::UrlSafeReferenceHash, true)),
    ("5", rules(EventFormat::V2, EventIdFormat::UrlSafeReferenceHash, true)),
    ("6", rules(EventFormat::V2, EventIdFormat::UrlSafeReferenceHash, false)),
];

const fn rules(
    event_format: EventFormat,
    event_id_format: EventIdFormat,
    special_case_aliases: bool,
) -> RoomVersionRules {
    RoomVersionRules { event_format, event_id_format, special_case_aliases }
}

/// An opaque room version identifier, e.g. `"5"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomVersionId(String);

impl RoomVersionId {
    /// The version assumed when a remote server does not state one.
    pub fn v1() -> Self {
        Self("1".to_owned())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rules for this version, or `UnsupportedRoomVersion` if unknown.
    pub fn rules(&self) -> Result<RoomVersionRules, FederationError> {
        KNOWN_ROOM_VERSIONS
            .iter()
            .find(|(id, _)| *id == self.0)
            .map(|(_, rules)| *rules)
            .ok_or_else(|| FederationError::UnsupportedRoomVersion(self.0.clone()))
    }

    pub fn event_format(&self) -> Result<EventFormat, FederationError> {
        self.rules().map(|r| r.event_format)
    }

    pub fn is_known(&self) -> bool {
        self.rules().is_ok()
    }
}

impl fmt::Display for RoomVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomVersionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// All known room versions, oldest first.
pub fn known_room_versions() -> impl Iterator<Item = RoomVersionId> {
    KNOWN_ROOM_VERSIONS.iter().map(|(id, _)| RoomVersionId::from(*id))
}
