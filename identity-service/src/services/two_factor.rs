//! Two-factor challenge engine.
//!
//! Per (user, channel): `Issued -> Verified | Superseded | Expired`. The
//! store fences issuing and consuming; this layer generates codes, hashes
//! them and talks to the dispatcher.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use super::dispatch::{CodeDispatcher, DispatchStatus};
use super::error::AuthError;
use crate::config::TwoFactorConfig;
use crate::models::{TwoFactorChallenge, TwoFactorType, User};
use crate::store::TwoFactorStore;

const CODE_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
const TOTP_SECRET_BYTES: usize = 20;

/// What an authenticator app needs to start producing codes.
#[derive(Debug, Clone)]
pub struct AuthenticatorEnrollment {
    pub secret: String,
    pub uri: String,
    pub manual_entry_key: String,
}

#[derive(Clone)]
pub struct TwoFactorService {
    store: Arc<dyn TwoFactorStore>,
    dispatcher: Arc<dyn CodeDispatcher>,
    code_ttl: Duration,
    max_attempts: i32,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(
        store: Arc<dyn TwoFactorStore>,
        dispatcher: Arc<dyn CodeDispatcher>,
        config: &TwoFactorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            code_ttl: Duration::seconds(config.code_ttl_seconds),
            max_attempts: config.max_attempts,
            issuer: config.totp_issuer.clone(),
        }
    }

    /// Supersedes open challenges of the channel, stores a fresh one and
    /// dispatches its code. The returned status only reflects delivery.
    /// Authenticator challenges carry no code and are never dispatched.
    pub async fn generate_and_send(
        &self,
        user: &User,
        channel: TwoFactorType,
        now: DateTime<Utc>,
    ) -> Result<DispatchStatus, AuthError> {
        let recipient = match channel {
            TwoFactorType::Email => Some(user.email.clone()),
            TwoFactorType::Sms => user.phone_number.clone(),
            TwoFactorType::Authenticator => None,
        };

        let code = channel.is_dispatched().then(generate_code);

        let challenge = TwoFactorChallenge {
            id: Uuid::new_v4(),
            user_id: user.id,
            channel,
            code_hash: code.as_deref().map(|c| hash_code(user.id, c)),
            recipient: recipient.clone(),
            attempt_count: 0,
            issued_utc: now,
            expiry_utc: now + self.code_ttl,
            verified_utc: None,
            superseded_utc: None,
        };

        let superseded = self.store.issue(challenge, now).await?;
        tracing::info!(
            user_id = %user.id,
            channel = %channel,
            superseded,
            "Two-factor challenge issued"
        );

        let Some(code) = code else {
            return Ok(DispatchStatus::Delivered);
        };

        let Some(recipient) = recipient else {
            tracing::warn!(user_id = %user.id, channel = %channel, "No recipient for two-factor code");
            return Ok(DispatchStatus::Failed);
        };

        let sent = match channel {
            TwoFactorType::Sms => self.dispatcher.send_sms(&recipient, &code).await,
            _ => self.dispatcher.send_email(&recipient, &code).await,
        };

        match sent {
            Ok(()) => Ok(DispatchStatus::Delivered),
            Err(e) => {
                tracing::warn!(user_id = %user.id, channel = %channel, error = %e, "Two-factor dispatch failed");
                Ok(DispatchStatus::Failed)
            }
        }
    }

    /// Consumes the open challenge for `channel` when `code` matches it.
    /// For the authenticator channel the code is a TOTP over the user's key.
    /// A wrong code counts against the open challenge.
    pub async fn verify(
        &self,
        user: &User,
        code: &str,
        channel: TwoFactorType,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let code = code.trim();
        let well_formed = code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit());

        let consumed = if !well_formed {
            false
        } else if channel == TwoFactorType::Authenticator {
            let totp_ok = user
                .authenticator_key
                .as_deref()
                .is_some_and(|key| verify_totp(key, code, unix_seconds(now)));
            totp_ok
                && self
                    .store
                    .consume(user.id, channel, None, self.max_attempts, now)
                    .await?
        } else {
            let hash = hash_code(user.id, code);
            self.store
                .consume(user.id, channel, Some(&hash), self.max_attempts, now)
                .await?
        };

        if consumed {
            tracing::info!(user_id = %user.id, channel = %channel, "Two-factor challenge verified");
            return Ok(());
        }

        self.store
            .record_failed_attempt(user.id, channel, self.max_attempts, now)
            .await?;
        tracing::warn!(user_id = %user.id, channel = %channel, "Two-factor verification failed");
        Err(AuthError::InvalidTwoFactorCode)
    }

    pub fn enroll_authenticator(&self, account: &str) -> Result<AuthenticatorEnrollment, AuthError> {
        let mut bytes = [0u8; TOTP_SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let secret = Secret::Raw(bytes.to_vec()).to_encoded().to_string();

        let uri = format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&digits={digits}&period={period}",
            issuer = urlencoding::encode(&self.issuer),
            account = urlencoding::encode(account),
            secret = secret,
            digits = CODE_DIGITS,
            period = TOTP_STEP_SECONDS,
        );

        Ok(AuthenticatorEnrollment {
            manual_entry_key: group_key(&secret),
            secret,
            uri,
        })
    }
}

fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Codes are bound to the user so equal codes never share a hash.
fn hash_code(user_id: Uuid, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_seconds(now: DateTime<Utc>) -> u64 {
    u64::try_from(now.timestamp()).unwrap_or_default()
}

fn totp_for(secret: &str) -> Option<TOTP> {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().ok()?;
    TOTP::new(Algorithm::SHA1, CODE_DIGITS, 1, TOTP_STEP_SECONDS, bytes).ok()
}

/// RFC 6238 check with one step of drift either side.
pub fn verify_totp(secret: &str, code: &str, unix_time: u64) -> bool {
    totp_for(secret).is_some_and(|totp| totp.check(code, unix_time))
}

pub fn generate_totp(secret: &str, unix_time: u64) -> Option<String> {
    totp_for(secret).map(|totp| totp.generate(unix_time))
}

fn group_key(secret: &str) -> String {
    secret
        .as_bytes()
        .chunks(4)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .collect::<Vec<_>>()
        .join(" ")
}
