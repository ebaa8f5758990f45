//! Classifying the `{roomIdOrAlias}` path parameter.

use haven_common::{IdError, RoomAlias, RoomId};

use crate::outcome::BadRequest;

/// A join target, parsed once at the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomTarget {
    Id(RoomId),
    Alias(RoomAlias),
}

impl RoomTarget {
    pub fn parse(raw: &str) -> Result<Self, BadRequest> {
        match raw.chars().next() {
            None => Err(BadRequest::EmptyTarget),
            Some(RoomId::SIGIL) => RoomId::parse(raw)
                .map(RoomTarget::Id)
                .map_err(|_: IdError| BadRequest::MalformedRoomId),
            Some(RoomAlias::SIGIL) => RoomAlias::parse(raw)
                .map(RoomTarget::Alias)
                .map_err(|_: IdError| BadRequest::MalformedAlias),
            Some(other) => Err(BadRequest::InvalidTarget(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils_select_the_variant() {
        assert!(matches!(RoomTarget::parse("!abc:example.org"), Ok(RoomTarget::Id(_))));
        assert!(matches!(RoomTarget::parse("#foo:example.org"), Ok(RoomTarget::Alias(_))));
    }

    #[test]
    fn user_id_is_not_a_target() {
        assert_eq!(
            RoomTarget::parse("@not-a-room-or-alias"),
            Err(BadRequest::InvalidTarget('@'))
        );
        assert_eq!(
            BadRequest::InvalidTarget('@').to_string(),
            "Invalid first character '@' for room ID or alias"
        );
    }

    #[test]
    fn multibyte_first_character_is_reported_whole() {
        assert_eq!(RoomTarget::parse("é:x"), Err(BadRequest::InvalidTarget('é')));
    }

    #[test]
    fn alias_without_domain_is_malformed() {
        assert_eq!(RoomTarget::parse("#foo"), Err(BadRequest::MalformedAlias));
        assert_eq!(RoomTarget::parse("!abc"), Err(BadRequest::MalformedRoomId));
        assert_eq!(RoomTarget::parse(""), Err(BadRequest::EmptyTarget));
    }
}
