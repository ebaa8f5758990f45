//! Ed25519 server signing key management.
//!
//! Each Haven server possesses an Ed25519 key pair used to sign outbound
//! federation requests and events. Remote servers verify these signatures using
//! the public key fetched from `/_matrix/key/v2/server`.
//!
//! # Key IDs
//! Key IDs follow the Matrix convention: `ed25519:<fingerprint>`.
//! The fingerprint is the first 6 bytes of the public key, hex-encoded.
//!
//! # Encoding
//! Public keys and signatures travel as unpadded standard base64, as the
//! Matrix federation API requires.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{Duration, Utc};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::FederationError, signatures::canonical_json};

// ─── Key pair ────────────────────────────────────────────────────────────────

/// An Ed25519 signing key pair for this Haven server.
///
/// The `ServerKeyPair` is the single source of truth for all outbound
/// federation signatures.
pub struct ServerKeyPair {
    /// Key ID in the format `ed25519:<12-char-hex>`.
    pub key_id: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeyPair").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl ServerKeyPair {
    /// Generate a brand-new random Ed25519 key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key_id = derive_key_id(signing_key.verifying_key().as_bytes());
        Self { key_id, signing_key }
    }

    /// Reconstruct a `ServerKeyPair` from raw 32-byte seed bytes (as stored in DB).
    pub fn from_seed(seed: &[u8]) -> Result<Self, FederationError> {
        let bytes: [u8; 32] = seed
            .try_into()
            .map_err(|_| FederationError::InvalidSeed)?;
        let signing_key = SigningKey::from_bytes(&bytes);
        let key_id = derive_key_id(signing_key.verifying_key().as_bytes());
        Ok(Self { key_id, signing_key })
    }

    /// Return the 32-byte seed (private key scalar) for persistence.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Return the public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Return the public key as unpadded base64 (for `/_matrix/key/v2/server`).
    pub fn public_key_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign arbitrary bytes and return the base64-encoded signature.
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        let sig = self.signing_key.sign(bytes);
        STANDARD_NO_PAD.encode(sig.to_bytes())
    }

    /// Sign a canonical JSON string and return the base64-encoded signature.
    pub fn sign_json(&self, canonical_json: &str) -> String {
        self.sign_bytes(canonical_json.as_bytes())
    }

    /// Build the self-signed key document served at `/_matrix/key/v2/server`.
    pub fn to_key_document(
        &self,
        server_name: &str,
        ttl: Duration,
    ) -> Result<ServerKeyDocument, FederationError> {
        let mut verify_keys = BTreeMap::new();
        verify_keys.insert(self.key_id.clone(), VerifyKey { key: self.public_key_base64() });
        let mut doc = ServerKeyDocument {
            server_name: server_name.to_owned(),
            verify_keys,
            old_verify_keys: BTreeMap::new(),
            valid_until_ts: (Utc::now() + ttl).timestamp_millis(),
            signatures: BTreeMap::new(),
        };

        let sig = self.sign_json(&canonical_json(&doc.signable()?)?);
        doc.signatures
            .entry(server_name.to_owned())
            .or_default()
            .insert(self.key_id.clone(), sig);
        Ok(doc)
    }
}

// ─── Key document (wire format) ───────────────────────────────────────────────

/// A single public verify key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyKey {
    /// Unpadded base64 Ed25519 public key bytes.
    pub key: String,
}

/// A retired key, still valid for events signed before `expired_ts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldVerifyKey {
    pub key: String,
    pub expired_ts: i64,
}

/// The signed key document served at `/_matrix/key/v2/server`.
///
/// Remote servers cache this document to verify future signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerKeyDocument {
    pub server_name: String,
    pub verify_keys: BTreeMap<String, VerifyKey>,
    #[serde(default)]
    pub old_verify_keys: BTreeMap<String, OldVerifyKey>,
    /// Unix millisecond timestamp after which this document should be re-fetched.
    pub valid_until_ts: i64,
    #[serde(default)]
    pub signatures: BTreeMap<String, BTreeMap<String, String>>,
}

impl ServerKeyDocument {
    /// The document as JSON without its `signatures` block.
    fn signable(&self) -> Result<Value, FederationError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("signatures");
        }
        Ok(value)
    }

    /// Parse a key document received from `server_name` and check that it is
    /// signed by one of its own current keys.
    ///
    /// The signature is checked over the raw JSON, so fields this server does
    /// not model still count.
    pub fn from_signed_json(server_name: &str, raw: Value) -> Result<Self, FederationError> {
        let doc: ServerKeyDocument = serde_json::from_value(raw.clone())?;
        if doc.server_name != server_name {
            return Err(FederationError::RemoteProtocol(
                server_name.to_owned(),
                format!("key document names server '{}'", doc.server_name),
            ));
        }

        let mut signable = raw;
        if let Some(obj) = signable.as_object_mut() {
            obj.remove("signatures");
        }
        let canonical = canonical_json(&signable)?;

        let sigs = doc
            .signatures
            .get(server_name)
            .ok_or_else(|| FederationError::MissingSignature(server_name.to_owned()))?;
        let verified = sigs.iter().any(|(key_id, sig)| {
            doc.verify_keys
                .get(key_id)
                .is_some_and(|vk| verify_signature(&vk.key, sig, canonical.as_bytes()).is_ok())
        });
        if verified { Ok(doc) } else { Err(FederationError::InvalidSignature) }
    }

    /// Public key for `key_id`, including expired keys.
    pub fn key(&self, key_id: &str) -> Option<&str> {
        self.verify_keys
            .get(key_id)
            .map(|k| k.key.as_str())
            .or_else(|| self.old_verify_keys.get(key_id).map(|k| k.key.as_str()))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Derive a stable key ID from raw public key bytes.
///
/// Uses the first 6 bytes of the pubkey as a short hex fingerprint.
fn derive_key_id(pubkey_bytes: &[u8]) -> String {
    let fingerprint = hex::encode(&pubkey_bytes[..6]);
    format!("ed25519:{}", fingerprint)
}

/// Verify an Ed25519 signature.
///
/// * `pubkey_base64`: unpadded base64 32-byte verifying key
/// * `sig_base64`   : unpadded base64 64-byte signature
/// * `message`      : original signed bytes
pub fn verify_signature(
    pubkey_base64: &str,
    sig_base64: &str,
    message: &[u8],
) -> Result<(), FederationError> {
    use ed25519_dalek::Verifier;

    let pubkey_bytes = decode_base64(pubkey_base64)?;
    let sig_bytes = decode_base64(sig_base64)?;

    let verifying_key = VerifyingKey::from_bytes(
        pubkey_bytes
            .as_slice()
            .try_into()
            .map_err(|_| FederationError::InvalidSignature)?,
    )
    .map_err(|_| FederationError::InvalidSignature)?;

    let signature = ed25519_dalek::Signature::from_bytes(
        sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| FederationError::InvalidSignature)?,
    );

    verifying_key.verify(message, &signature).map_err(|_| FederationError::InvalidSignature)
}

// Servers differ on padding; accept both.
fn decode_base64(s: &str) -> Result<Vec<u8>, FederationError> {
    STANDARD_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|_| FederationError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_sign_verify() {
        let kp = ServerKeyPair::generate();
        let msg = b"hello haven federation";
        let sig = kp.sign_bytes(msg);
        verify_signature(&kp.public_key_base64(), &sig, msg).expect("signature should verify");
        assert!(verify_signature(&kp.public_key_base64(), &sig, b"tampered").is_err());
    }

    #[test]
    fn from_seed_is_stable() {
        let kp1 = ServerKeyPair::generate();
        let seed = kp1.seed_bytes();
        let kp2 = ServerKeyPair::from_seed(&seed).unwrap();
        assert_eq!(kp1.key_id, kp2.key_id);
        assert_eq!(kp1.public_key_base64(), kp2.public_key_base64());
    }

    #[test]
    fn key_document_is_self_signed() {
        let kp = ServerKeyPair::generate();
        let doc = kp.to_key_document("haven.example.com", Duration::days(1)).unwrap();
        let raw = serde_json::to_value(&doc).unwrap();

        let parsed = ServerKeyDocument::from_signed_json("haven.example.com", raw.clone())
            .expect("fresh document should verify");
        assert_eq!(parsed.key(&kp.key_id), Some(kp.public_key_base64().as_str()));

        let mut tampered = raw.clone();
        tampered["valid_until_ts"] = serde_json::json!(0);
        assert!(ServerKeyDocument::from_signed_json("haven.example.com", tampered).is_err());

        assert!(ServerKeyDocument::from_signed_json("impostor.example.com", raw).is_err());
    }
}
