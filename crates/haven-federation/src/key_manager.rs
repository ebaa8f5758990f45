//! This server's Ed25519 signing key, persisted in `federation_keys`.
//!
//! The newest active row that has not expired is reused across restarts.
//! With none left, a fresh pair is generated and stored with an expiry of
//! `federation.key_ttl_days`. Deactivating the row (`is_active = FALSE`)
//! forces a new key on the next start.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{error::FederationError, keys::ServerKeyPair};

pub struct KeyManager {
    pool: PgPool,
    key_ttl: Duration,
}

impl KeyManager {
    pub fn new(pool: PgPool, key_ttl_days: i64) -> Self {
        Self { pool, key_ttl: Duration::days(key_ttl_days) }
    }

    /// The active signing key, provisioning one if needed.
    pub async fn load_or_generate(&self) -> Result<Arc<ServerKeyPair>, FederationError> {
        if let Some(kp) = self.load_active().await? {
            info!(key_id = %kp.key_id, "Loaded federation signing key");
            return Ok(Arc::new(kp));
        }

        warn!("No usable federation signing key, generating a new Ed25519 key pair");
        let kp = ServerKeyPair::generate();
        self.store(&kp, Utc::now() + self.key_ttl).await?;
        info!(key_id = %kp.key_id, "Stored new federation signing key");
        Ok(Arc::new(kp))
    }

    async fn load_active(&self) -> Result<Option<ServerKeyPair>, FederationError> {
        let row: Option<(String, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT key_id, seed_bytes
            FROM federation_keys
            WHERE is_active AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some((stored, seed)) = row else {
            return Ok(None);
        };
        let kp = ServerKeyPair::from_seed(&seed)?;
        if kp.key_id != stored {
            return Err(FederationError::StoredKeyMismatch { stored, derived: kp.key_id.clone() });
        }
        Ok(Some(kp))
    }

    async fn store(
        &self,
        kp: &ServerKeyPair,
        expires_at: DateTime<Utc>,
    ) -> Result<(), FederationError> {
        sqlx::query(
            r#"
            INSERT INTO federation_keys (key_id, seed_bytes, public_key_b64, expires_at, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (key_id) DO NOTHING
            "#,
        )
        .bind(&kp.key_id)
        .bind(kp.seed_bytes().to_vec())
        .bind(kp.public_key_base64())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
