//! Federation request and JSON object signing.
//!
//! All outbound server-to-server HTTP requests carry a signed Authorization header:
//!
//! ```text
//! Authorization: X-Matrix origin="haven.example.com",destination="matrix.other.tld",
//!                key="ed25519:3f9a2c0b11d4",sig="<base64-encoded-signature>"
//! ```
//!
//! The signed content is the canonical JSON of a request object:
//!
//! ```json
//! {
//!   "method":      "PUT",
//!   "uri":         "/_matrix/federation/v2/send_join/!room:other.tld/$event",
//!   "origin":      "haven.example.com",
//!   "destination": "matrix.other.tld",
//!   "content":     { ... }   // only present for PUT/POST
//! }
//! ```
//!
//! Events and key documents are signed the same way: the object minus its
//! `signatures` and `unsigned` keys, serialised as canonical JSON.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    error::FederationError,
    keys::{verify_signature, ServerKeyPair},
};

// ─── Request signing ─────────────────────────────────────────────────────────

/// A signed federation request authorization, ready to be serialised into
/// an HTTP `Authorization` header.
#[derive(Debug, Clone)]
pub struct XMatrixAuth {
    pub origin: String,
    pub destination: String,
    pub key_id: String,
    pub sig: String,
}

impl XMatrixAuth {
    /// Build the `Authorization: X-Matrix …` header value.
    pub fn to_header(&self) -> String {
        format!(
            r#"X-Matrix origin="{}",destination="{}",key="{}",sig="{}""#,
            self.origin, self.destination, self.key_id, self.sig,
        )
    }
}

/// Sign an outbound federation request and return the [`XMatrixAuth`].
///
/// # Arguments
///
/// * `kp`         : this server's signing key pair
/// * `origin`     : this server's name
/// * `destination`: remote server's name
/// * `method`     : HTTP method, uppercase (e.g. `"PUT"`)
/// * `uri`        : request URI path + query
/// * `content`    : request body (pass `None` for GET requests)
pub fn sign_request(
    kp: &ServerKeyPair,
    origin: &str,
    destination: &str,
    method: &str,
    uri: &str,
    content: Option<&Value>,
) -> XMatrixAuth {
    let canonical = build_signing_object(origin, destination, method, uri, content);
    let sig = kp.sign_json(&canonical);
    XMatrixAuth {
        origin: origin.to_owned(),
        destination: destination.to_owned(),
        key_id: kp.key_id.clone(),
        sig,
    }
}

// ─── Object signing ──────────────────────────────────────────────────────────

/// Sign a JSON object, ignoring any `signatures` and `unsigned` keys it holds.
pub fn sign_json_object(kp: &ServerKeyPair, object: &Value) -> Result<String, FederationError> {
    Ok(kp.sign_json(&signable_canonical(object)?))
}

/// Verify a signature produced by [`sign_json_object`].
pub fn verify_json_object(
    pubkey_base64: &str,
    sig_base64: &str,
    object: &Value,
) -> Result<(), FederationError> {
    let canonical = signable_canonical(object)?;
    verify_signature(pubkey_base64, sig_base64, canonical.as_bytes())
}

fn signable_canonical(object: &Value) -> Result<String, FederationError> {
    let mut obj = object.as_object().cloned().ok_or_else(|| {
        FederationError::MalformedEvent("signed value must be a JSON object".into())
    })?;
    obj.remove("signatures");
    obj.remove("unsigned");
    canonical_json(&Value::Object(obj))
}

// ─── Internals ───────────────────────────────────────────────────────────────

/// Build the canonical JSON object that is signed for an HTTP request.
fn build_signing_object(
    origin: &str,
    destination: &str,
    method: &str,
    uri: &str,
    content: Option<&Value>,
) -> String {
    let mut map = serde_json::Map::new();
    map.insert("method".into(), Value::String(method.to_uppercase()));
    map.insert("uri".into(), Value::String(uri.to_owned()));
    map.insert("origin".into(), Value::String(origin.to_owned()));
    map.insert("destination".into(), Value::String(destination.to_owned()));
    if let Some(body) = content {
        map.insert("content".into(), body.clone());
    }
    sort_keys(&Value::Object(map)).to_string()
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
///
/// Follows the Matrix canonical JSON rules: keys sorted lexicographically by
/// code point, compact separators, UTF-8 output.
pub fn canonical_json(value: &Value) -> Result<String, FederationError> {
    Ok(serde_json::to_string(&sort_keys(value))?)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: serde_json::Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect();
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let v = json!({"b": 1, "a": {"d": [ {"z": 1, "y": 2} ], "c": null}});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a":{"c":null,"d":[{"y":2,"z":1}]},"b":1}"#
        );
    }

    #[test]
    fn object_signature_ignores_signatures_and_unsigned() {
        let kp = ServerKeyPair::generate();
        let event = json!({"type": "m.room.member", "content": {"membership": "join"}});
        let sig = sign_json_object(&kp, &event).unwrap();

        let decorated = json!({
            "type": "m.room.member",
            "content": {"membership": "join"},
            "unsigned": {"age": 5},
            "signatures": {"other.tld": {"ed25519:x": "abc"}}
        });
        verify_json_object(&kp.public_key_base64(), &sig, &decorated).expect("should verify");

        let altered = json!({"type": "m.room.member", "content": {"membership": "leave"}});
        assert!(verify_json_object(&kp.public_key_base64(), &sig, &altered).is_err());
    }

    #[test]
    fn request_header_names_origin_destination_and_key() {
        let kp = ServerKeyPair::generate();
        let auth = sign_request(
            &kp,
            "haven.example.com",
            "other.tld",
            "get",
            "/_matrix/key/v2/server",
            None,
        );
        let header = auth.to_header();
        assert!(header.starts_with("X-Matrix origin=\"haven.example.com\""));
        assert!(header.contains("destination=\"other.tld\""));
        assert!(header.contains(&format!("key=\"{}\"", kp.key_id)));
    }
}
