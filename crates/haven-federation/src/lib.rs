//! # haven-federation
//!
//! Matrix server-to-server (S2S) plumbing used by Haven to join rooms hosted
//! on other homeservers.
//!
//! ## Architecture
//!
//! ```text
//!  haven.example.com                          example.org
//!       │                                          │
//!       ├─── GET  /make_join/{room}/{user} ──────► │
//!       │ ◄──────────────── join template ──────── │
//!       │   (fill in, hash, sign)                  │
//!       ├─── PUT  /send_join/{room}/{event} ─────► │
//!       │ ◄──────────── state + auth chain ─────── │
//!       ├─── GET  /_matrix/key/v2/server ────────► │ (on key-ring miss)
//! ```
//!
//! ## Key concepts
//!
//! - **Server keys** (`keys.rs`, `key_manager.rs`): each Haven server holds an
//!   Ed25519 signing key pair persisted in PostgreSQL and advertised via
//!   `/_matrix/key/v2/server`.
//! - **Signing** (`signatures.rs`): `X-Matrix` request authorization and JSON
//!   object signatures over canonical JSON.
//! - **Room versions** (`room_version.rs`): the event-format rules each known
//!   room version implies.
//! - **Events** (`events.rs`): templates, content hashes, redaction, and event
//!   IDs; turns a template into a [`SignedEvent`].
//! - **Discovery** (`discovery.rs`): resolves `server.tld` to an HTTPS base URL
//!   via `/.well-known/matrix/server` or the default port.
//! - **Federation client** (`client.rs`): signed `make_join`, `send_join`,
//!   directory, and key requests.
//! - **Key ring** (`keyring.rs`): cached remote verify keys and signature checks
//!   over `send_join` responses.

pub mod client;
pub mod discovery;
pub mod error;
pub mod events;
pub mod key_manager;
pub mod keyring;
pub mod keys;
pub mod room_version;
pub mod signatures;
pub mod types;

pub use client::FederationClient;
pub use error::FederationError;
pub use events::{EventReference, Pdu, ProtoEvent, SignedEvent};
pub use key_manager::KeyManager;
pub use keyring::{KeyFetcher, KeyRing};
pub use keys::{ServerKeyDocument, ServerKeyPair};
pub use room_version::{EventFormat, RoomVersionId, RoomVersionRules};
pub use types::{MakeJoinResponse, RoomAliasResponse, SendJoinResponse, WellKnownServer};
