//! Token issuance and rotation.
//!
//! Access tokens are HS256 JWTs; refresh tokens are opaque random strings
//! stored only as SHA-256 hashes. Rotation is single-use: the store revokes
//! the presented token iff it is still active and inserts the replacement in
//! the same transaction, so concurrent callers get exactly one winner.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use service_core::middleware::tracing::CorrelationId;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::device::DeviceTracker;
use super::error::AuthError;
use super::jwt::{AccessTokenClaims, ClaimContext, JwtService};
use super::permissions::PermissionCatalog;
use crate::config::JwtConfig;
use crate::models::{DeviceContext, RefreshToken, User};
use crate::store::{CredentialStore, RefreshTokenStore};

const REFRESH_TOKEN_BYTES: usize = 64;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    /// `jti` shared by the access token and its refresh record
    pub token_id: String,
}

#[derive(Clone)]
pub struct TokenService {
    jwt: JwtService,
    catalog: Arc<PermissionCatalog>,
    users: Arc<dyn CredentialStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    devices: DeviceTracker,
    refresh_lifetime: Duration,
    remember_me_lifetime: Duration,
}

impl TokenService {
    pub fn new(
        config: &JwtConfig,
        catalog: Arc<PermissionCatalog>,
        users: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        devices: DeviceTracker,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self {
            jwt: JwtService::new(config)?,
            catalog,
            users,
            refresh_tokens,
            devices,
            refresh_lifetime: Duration::days(config.refresh_token_expiry_days),
            remember_me_lifetime: Duration::days(config.remember_me_refresh_token_expiry_days),
        })
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Mints an access/refresh pair for `user` on `device` and persists the
    /// refresh record.
    #[tracing::instrument(skip_all, fields(user_id = %user.id, correlation_id = %correlation_id))]
    pub async fn issue_token_pair(
        &self,
        user: &User,
        device: &DeviceContext,
        remember_me: bool,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let lifetime = if remember_me {
            self.remember_me_lifetime
        } else {
            self.refresh_lifetime
        };

        let (pair, record) = self.mint(user, device, lifetime, now).await?;
        self.refresh_tokens.insert(record).await?;

        tracing::info!(token_id = %pair.token_id, "Token pair issued");
        Ok(pair)
    }

    /// Exchanges a refresh token for a new pair. The replacement keeps the
    /// lifetime of the token it replaces.
    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn refresh_token_pair(
        &self,
        refresh_token: &str,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let old_hash = RefreshToken::hash_token(refresh_token);

        let existing = self
            .refresh_tokens
            .find_by_hash(&old_hash)
            .await?
            .filter(|t| t.is_active_at(now))
            .ok_or(AuthError::InvalidOrExpiredRefreshToken)?;

        let user = self
            .users
            .find_by_id(existing.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidOrExpiredRefreshToken)?;

        let (pair, record) = self.mint(&user, device, existing.lifetime(), now).await?;
        let new_id = record.id;

        if !self.refresh_tokens.rotate(&old_hash, now, record).await? {
            tracing::warn!(user_id = %user.id, "Refresh token lost rotation race or was revoked");
            return Err(AuthError::InvalidOrExpiredRefreshToken);
        }

        tracing::info!(
            user_id = %user.id,
            replaced = %existing.id,
            replacement = %new_id,
            "Refresh token rotated"
        );
        Ok(pair)
    }

    pub fn validate_access_token(&self, token: &str) -> Option<AccessTokenClaims> {
        self.jwt.validate_access_token(token)
    }

    /// Revokes one of `user_id`'s refresh tokens. Unknown or foreign tokens
    /// are a no-op.
    pub async fn revoke_token(
        &self,
        refresh_token: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let revoked = self
            .refresh_tokens
            .revoke(&RefreshToken::hash_token(refresh_token), user_id, now)
            .await?;
        tracing::info!(user_id = %user_id, revoked, "Refresh token revocation");
        Ok(revoked)
    }

    /// Revokes every refresh token of the user and rotates the security stamp.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let revoked = self.refresh_tokens.revoke_all_for_user(user_id, now).await?;
        self.users.update_security_stamp(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked");
        Ok(revoked)
    }

    pub async fn active_token_count(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AuthError> {
        Ok(self.refresh_tokens.count_active_for_user(user_id, now).await?)
    }

    async fn mint(
        &self,
        user: &User,
        device: &DeviceContext,
        refresh_lifetime: Duration,
        now: DateTime<Utc>,
    ) -> Result<(TokenPair, RefreshToken), AuthError> {
        let roles = self.users.get_roles(user.id).await?;
        let permissions = self.catalog.effective_permissions(roles.as_slice()).into_iter().collect();
        let is_trusted = self.devices.resolve_trust(user.id, &device.device_id).await?;

        let claims = self.jwt.build_claims(
            user,
            ClaimContext {
                roles,
                permissions,
                device,
                is_trusted,
                issued_at: now,
            },
        );
        let access_token = self.jwt.encode_access_token(&claims)?;
        let refresh_token = generate_refresh_token();
        let refresh_expires = now + refresh_lifetime;

        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: RefreshToken::hash_token(&refresh_token),
            jwt_id: claims.jti.clone(),
            device_id: Some(device.device_id.clone()),
            ip_address: device.ip_address.clone(),
            user_agent: device.user_agent.clone(),
            issued_utc: now,
            expiry_utc: refresh_expires,
            revoked_utc: None,
            replaced_by: None,
        };

        let pair = TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            access_token_expires_at: now + Duration::minutes(self.jwt.access_token_expiry_minutes()),
            refresh_token_expires_at: refresh_expires,
            token_id: claims.jti,
        };

        Ok((pair, record))
    }
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
