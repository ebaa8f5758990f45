//! Remote server verify keys and event signature checks.
//!
//! The [`KeyRing`] caches each remote server's key document until its
//! `valid_until_ts` and fetches it again on a miss. It is shared by every
//! join request, so the cache sits behind an async `RwLock`.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use haven_common::UserId;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    client::FederationClient,
    error::FederationError,
    events::{Pdu, SignedEvent},
    keys::{ServerKeyDocument, ServerKeyPair},
    room_version::RoomVersionRules,
    signatures::verify_json_object,
    types::SendJoinResponse,
};

/// Source of raw key documents for remote servers.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_server_keys(&self, server_name: &str) -> Result<Value, FederationError>;
}

#[async_trait]
impl KeyFetcher for FederationClient {
    async fn fetch_server_keys(&self, server_name: &str) -> Result<Value, FederationError> {
        FederationClient::fetch_server_keys(self, server_name).await
    }
}

#[derive(Debug, Clone)]
struct CachedKeys {
    keys: HashMap<String, String>,
    valid_until_ts: i64,
}

impl CachedKeys {
    fn from_document(doc: &ServerKeyDocument) -> Self {
        let mut keys: HashMap<String, String> =
            doc.verify_keys.iter().map(|(id, k)| (id.clone(), k.key.clone())).collect();
        for (id, old) in &doc.old_verify_keys {
            keys.entry(id.clone()).or_insert_with(|| old.key.clone());
        }
        Self { keys, valid_until_ts: doc.valid_until_ts }
    }

    fn is_fresh(&self) -> bool {
        self.valid_until_ts > Utc::now().timestamp_millis()
    }

    /// Fold a newer document into this entry. Keys already held (including
    /// a pinned local key) survive unless the document republishes them.
    fn merge(&mut self, fetched: CachedKeys) {
        self.keys.extend(fetched.keys);
        self.valid_until_ts = self.valid_until_ts.max(fetched.valid_until_ts);
    }
}

/// Concurrency-safe cache of remote verify keys.
pub struct KeyRing {
    fetcher: Arc<dyn KeyFetcher>,
    cache: RwLock<HashMap<String, CachedKeys>>,
}

impl KeyRing {
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self { fetcher, cache: RwLock::new(HashMap::new()) }
    }

    /// Pin this server's own key so local signatures never trigger a fetch.
    pub async fn with_local_key(self, server_name: &str, key_pair: &ServerKeyPair) -> Self {
        let mut keys = HashMap::new();
        keys.insert(key_pair.key_id.clone(), key_pair.public_key_base64());
        self.cache
            .write()
            .await
            .insert(server_name.to_owned(), CachedKeys { keys, valid_until_ts: i64::MAX });
        self
    }

    /// Public key `key_id` of `server_name`, fetching the key document when
    /// the cached copy is missing, stale, or lacks that key.
    pub async fn verify_key(
        &self,
        server_name: &str,
        key_id: &str,
    ) -> Result<String, FederationError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(server_name).filter(|e| e.is_fresh()) {
                if let Some(key) = entry.keys.get(key_id) {
                    return Ok(key.clone());
                }
            }
        }

        debug!(server = %server_name, key_id, "Fetching remote server keys");
        let raw = self.fetcher.fetch_server_keys(server_name).await?;
        let doc = ServerKeyDocument::from_signed_json(server_name, raw)?;
        let fetched = CachedKeys::from_document(&doc);

        let mut cache = self.cache.write().await;
        let entry = match cache.entry(server_name.to_owned()) {
            Entry::Occupied(held) => {
                let held = held.into_mut();
                held.merge(fetched);
                held
            }
            Entry::Vacant(slot) => slot.insert(fetched),
        };
        entry.keys.get(key_id).cloned().ok_or_else(|| FederationError::UnknownKey {
            server: server_name.to_owned(),
            key_id: key_id.to_owned(),
        })
    }

    /// Check that `pdu` is signed by the server of its sender.
    pub async fn verify_event(
        &self,
        pdu: &Pdu,
        rules: &RoomVersionRules,
    ) -> Result<(), FederationError> {
        let sender = pdu
            .sender()
            .ok_or_else(|| FederationError::MalformedEvent("event has no sender".into()))?;
        let origin = UserId::parse(sender)
            .map_err(|e| {
                FederationError::MalformedEvent(format!("bad sender '{}': {}", sender, e))
            })?
            .server_name();

        let sigs = pdu.signatures_for(origin.as_str());
        if sigs.is_empty() {
            return Err(FederationError::MissingSignature(origin.to_string()));
        }

        let redacted = pdu.redacted(rules);
        let mut last_err = FederationError::InvalidSignature;
        for (key_id, sig) in sigs {
            match self.verify_key(origin.as_str(), key_id).await {
                Ok(key) => match verify_json_object(&key, sig, &redacted) {
                    Ok(()) => return Ok(()),
                    Err(e) => last_err = e,
                },
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Validate a `send_join` answer: every state and auth-chain event must
    /// belong to `room_id` and carry a valid signature from its sender's
    /// server, and the join event itself must verify.
    pub async fn check_send_join(
        &self,
        response: &SendJoinResponse,
        join_event: &SignedEvent,
        room_id: &str,
    ) -> Result<(), FederationError> {
        let rules = join_event.room_version().rules()?;

        for pdu in response.state.iter().chain(response.auth_chain.iter()) {
            if pdu.room_id() != Some(room_id) {
                warn!(room_id, "send_join response contains an event from another room");
                return Err(FederationError::MalformedEvent(format!(
                    "event in send_join response does not belong to {}",
                    room_id
                )));
            }
            self.verify_event(pdu, &rules).await?;
        }

        self.verify_event(join_event.pdu(), &rules).await
    }
}
