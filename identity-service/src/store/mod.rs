//! Persistence collaborators of the identity core.
//!
//! Every method that changes more than one row is all-or-nothing; the
//! conditional ones (`rotate`, `consume`, `issue`) are the concurrency
//! fences the services rely on.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Device, DeviceContext, LoginHistoryEntry, NewUser, RefreshToken, TwoFactorChallenge,
    TwoFactorType, User,
};
use crate::utils::{verify_password, Password, PasswordHashString};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Record not found")]
    NotFound,

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Password check capability of a credential store.
#[async_trait]
pub trait PasswordVerifiable: Send + Sync {
    /// Argon2 verification against the stored hash; comparison is constant time.
    async fn verify_password(&self, user: &User, password: &Password) -> StoreResult<bool> {
        let hash = PasswordHashString::new(user.password_hash.clone());
        Ok(verify_password(password, &hash).is_ok())
    }
}

/// Role membership capability of a credential store.
#[async_trait]
pub trait RoleAssignable: Send + Sync {
    async fn get_roles(&self, user_id: Uuid) -> StoreResult<Vec<String>>;

    async fn assign_role(&self, user_id: Uuid, role: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait CredentialStore: PasswordVerifiable + RoleAssignable {
    async fn ping(&self) -> StoreResult<()>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Fails with `DuplicateEmail` when the (case-insensitive) email exists.
    async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> StoreResult<User>;

    /// Replaces the stamp and returns the new value.
    async fn update_security_stamp(&self, user_id: Uuid) -> StoreResult<String>;

    /// Counts one failure. When the count reaches `max_attempts` the account
    /// is locked until `lockout_end` and the counter restarts. Returns whether
    /// this call applied the lock.
    async fn record_failed_login(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lockout_end: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn reset_failed_logins(&self, user_id: Uuid) -> StoreResult<()>;

    async fn update_last_login(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;

    async fn set_authenticator_key(&self, user_id: Uuid, key: &str) -> StoreResult<()>;

    async fn enable_two_factor(&self, user_id: Uuid, channel: TwoFactorType) -> StoreResult<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: RefreshToken) -> StoreResult<()>;

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;

    /// Revokes `old_hash` iff it is still active at `now` and inserts
    /// `replacement` in the same transaction. `false` means another caller
    /// won the race (or the token was never active) and nothing was written.
    async fn rotate(
        &self,
        old_hash: &str,
        now: DateTime<Utc>,
        replacement: RefreshToken,
    ) -> StoreResult<bool>;

    /// Revokes one of the user's own tokens. Returns whether a row changed.
    async fn revoke(&self, token_hash: &str, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn count_active_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Deletes rows that expired or were revoked before `before`.
    async fn purge_stale(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    /// Supersedes every open challenge of the same (user, channel) and
    /// inserts `challenge`, atomically. Returns how many were superseded.
    async fn issue(&self, challenge: TwoFactorChallenge, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Marks the open challenge matching `code_hash` as verified. For
    /// authenticator challenges `code_hash` is `None`. Open means not
    /// verified, not superseded, `now <= expiry` and under `max_attempts`.
    async fn consume(
        &self,
        user_id: Uuid,
        channel: TwoFactorType,
        code_hash: Option<&str>,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Counts a wrong code against the open challenge; burns it at `max_attempts`.
    async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        channel: TwoFactorType,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Removes challenges whose expiry is strictly before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find_device(&self, user_id: Uuid, device_id: &str) -> StoreResult<Option<Device>>;

    /// Creates the device on first sight (trusted = `trust_new`), otherwise
    /// refreshes last-seen data. Never lowers an existing trust flag.
    async fn touch_device(
        &self,
        user_id: Uuid,
        context: &DeviceContext,
        trust_new: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Device>;

    async fn mark_trusted(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool>;

    async fn has_successful_access(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool>;

    async fn append_login_history(&self, entry: LoginHistoryEntry) -> StoreResult<()>;

    async fn list_devices(&self, user_id: Uuid) -> StoreResult<Vec<Device>>;

    /// Most recent first.
    async fn list_login_history(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<LoginHistoryEntry>>;
}

/// One handle per collaborator, typically all backed by the same store.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn CredentialStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub two_factor: Arc<dyn TwoFactorStore>,
    pub devices: Arc<dyn DeviceStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self::from_shared(Arc::new(MemoryStore::new()))
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_shared(Arc::new(PgStore::new(pool)))
    }

    fn from_shared<T>(store: Arc<T>) -> Self
    where
        T: CredentialStore + RefreshTokenStore + TwoFactorStore + DeviceStore + 'static,
    {
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            two_factor: store.clone(),
            devices: store,
        }
    }
}
