//! Membership event drafts.
//!
//! A [`MembershipDraft`] holds the fields this server controls in a join
//! event. It is written onto a fresh template for local joins and onto the
//! template returned by `make_join` for federated ones, so a remote server
//! cannot alter who joins, where, or with what content.

use haven_common::{RoomId, UserId};
use haven_federation::{ProtoEvent, events::MEMBER_EVENT_TYPE};
use serde_json::{Map, Value};

use crate::capabilities::Profile;

const CREATE_EVENT_TYPE: &str = "m.room.create";
const POWER_LEVELS_EVENT_TYPE: &str = "m.room.power_levels";
const JOIN_RULES_EVENT_TYPE: &str = "m.room.join_rules";

/// Caller content merged with the membership and profile fields.
///
/// Profile fields win over anything the client sent under the same keys.
pub fn join_content(request_content: &Map<String, Value>, profile: &Profile) -> Map<String, Value> {
    let mut content = request_content.clone();
    content.insert("membership".into(), Value::String("join".into()));
    content.insert("displayname".into(), Value::String(profile.display_name.clone()));
    content.insert("avatar_url".into(), Value::String(profile.avatar_url.clone()));
    content
}

/// The fields of a join event that this server decides.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipDraft {
    sender: UserId,
    room_id: RoomId,
    content: Map<String, Value>,
}

impl MembershipDraft {
    pub fn new(sender: &UserId, room_id: &RoomId, content: &Map<String, Value>) -> Self {
        Self { sender: sender.clone(), room_id: room_id.clone(), content: content.clone() }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Overwrite the draft's fields on `template`, leaving linkage
    /// (`prev_events`, `auth_events`, `depth`) untouched.
    pub fn write_to(&self, template: &mut ProtoEvent) {
        template.event_type = MEMBER_EVENT_TYPE.to_owned();
        template.sender = self.sender.as_str().to_owned();
        template.state_key = Some(self.sender.as_str().to_owned());
        template.room_id = self.room_id.as_str().to_owned();
        template.content = Value::Object(self.content.clone());
        template.unsigned = None;
        template.redacts = None;
    }

    /// A fresh template carrying only the draft's fields.
    pub fn template(&self) -> ProtoEvent {
        let mut template = ProtoEvent::default();
        self.write_to(&mut template);
        template
    }

    /// `(type, state_key)` of the current state events that authorize this join.
    pub fn state_needed(&self) -> Vec<(String, String)> {
        vec![
            (CREATE_EVENT_TYPE.to_owned(), String::new()),
            (POWER_LEVELS_EVENT_TYPE.to_owned(), String::new()),
            (JOIN_RULES_EVENT_TYPE.to_owned(), String::new()),
            (MEMBER_EVENT_TYPE.to_owned(), self.sender.as_str().to_owned()),
        ]
    }
}
