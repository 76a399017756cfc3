use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted refresh-token record. Only the SHA-256 of the secret is stored.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    /// `jti` of the access token minted alongside this refresh token.
    pub jwt_id: String,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
}

impl RefreshToken {
    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Active means not revoked and strictly before expiry.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_utc.is_none() && self.expiry_utc > now
    }

    pub fn lifetime(&self) -> Duration {
        self.expiry_utc - self.issued_utc
    }
}
