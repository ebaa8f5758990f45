//! Access tokens: HS256 JWTs whose subject is the full Matrix user ID.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT claims embedded in access tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (`@localpart:server`)
    pub sub: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// Generate a JWT access token for `user_id`.
pub fn generate_access_token(
    user_id: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_owned(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs as i64)).timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Validate and decode a JWT token.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = generate_access_token("@alice:haven.example.com", "s3cret", 60).unwrap();
        let claims = validate_token(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, "@alice:haven.example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token("@alice:haven.example.com", "s3cret", 60).unwrap();
        assert!(validate_token(&token, "other").is_err());
    }
}
