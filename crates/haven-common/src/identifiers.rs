//! Matrix-style identifiers: `@user:server`, `!room:server`, `#alias:server`.
//!
//! Every identifier is `<sigil><localpart>:<server name>`. The server name is
//! everything after the first colon, so it may carry an explicit port
//! (`!abc:example.org:8448`).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when decomposing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("expected identifier starting with '{expected}', got '{found}'")]
    WrongSigil { expected: char, found: char },

    #[error("identifier '{0}' has no server name")]
    MissingServerName(String),
}

/// Split an identifier into `(localpart, server_name)`, checking its sigil.
pub fn split_id(sigil: char, id: &str) -> Result<(&str, &str), IdError> {
    let mut chars = id.chars();
    let first = chars.next().ok_or(IdError::Empty)?;
    if first != sigil {
        return Err(IdError::WrongSigil { expected: sigil, found: first });
    }
    let rest = chars.as_str();
    match rest.split_once(':') {
        Some((local, domain)) if !domain.is_empty() => Ok((local, domain)),
        _ => Err(IdError::MissingServerName(id.to_owned())),
    }
}

// ─── Server name ─────────────────────────────────────────────────────────────

/// The domain-form identity of a participating server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(String);

impl ServerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl PartialEq<str> for ServerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ServerName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ─── Sigil identifiers ───────────────────────────────────────────────────────

macro_rules! sigil_id {
    ($(#[$meta:meta])* $name:ident, $sigil:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            full: String,
            colon: usize,
        }

        impl $name {
            pub const SIGIL: char = $sigil;

            pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
                let full = id.into();
                let (local, _) = split_id(Self::SIGIL, &full)?;
                let colon = Self::SIGIL.len_utf8() + local.len();
                Ok(Self { full, colon })
            }

            pub fn as_str(&self) -> &str {
                &self.full
            }

            pub fn localpart(&self) -> &str {
                &self.full[Self::SIGIL.len_utf8()..self.colon]
            }

            pub fn server_name(&self) -> ServerName {
                ServerName::new(&self.full[self.colon + 1..])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.full)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.full
            }
        }
    };
}

sigil_id!(
    /// A user ID, e.g. `@alice:haven.example.com`.
    UserId,
    '@'
);

sigil_id!(
    /// An opaque room ID, e.g. `!abc:example.org`. The embedded server name
    /// only says where the room was created, not who hosts it now.
    RoomId,
    '!'
);

sigil_id!(
    /// A human-readable room alias, e.g. `#foo:example.org`.
    RoomAlias,
    '#'
);
