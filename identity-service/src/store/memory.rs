use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{
    CredentialStore, DeviceStore, PasswordVerifiable, RefreshTokenStore, RoleAssignable,
    StoreError, StoreResult, TwoFactorStore,
};
use crate::models::{
    Device, DeviceContext, LoginHistoryEntry, NewUser, RefreshToken, TwoFactorChallenge,
    TwoFactorType, User,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Vec<String>>,
    refresh_tokens: Vec<RefreshToken>,
    challenges: Vec<TwoFactorChallenge>,
    devices: Vec<Device>,
    login_history: Vec<LoginHistoryEntry>,
}

/// Process-local store for development runs and tests.
///
/// All tables sit behind one mutex, so every trait method is a single
/// critical section and the conditional updates are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn user_mut<'a>(state: &'a mut MemoryState, user_id: Uuid) -> StoreResult<&'a mut User> {
        state.users.get_mut(&user_id).ok_or(StoreError::NotFound)
    }
}

fn hashes_match(stored: Option<&str>, candidate: Option<&str>) -> bool {
    match (stored, candidate) {
        (Some(a), Some(b)) => bool::from(a.as_bytes().ct_eq(b.as_bytes())),
        (None, None) => true,
        _ => false,
    }
}

fn is_open(challenge: &TwoFactorChallenge, max_attempts: i32, now: DateTime<Utc>) -> bool {
    challenge.verified_utc.is_none()
        && challenge.superseded_utc.is_none()
        && now <= challenge.expiry_utc
        && challenge.attempt_count < max_attempts
}

impl PasswordVerifiable for MemoryStore {}

#[async_trait]
impl RoleAssignable for MemoryStore {
    async fn get_roles(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        Ok(self.state()?.roles.get(&user_id).cloned().unwrap_or_default())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> StoreResult<()> {
        let mut state = self.state()?;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        let roles = state.roles.entry(user_id).or_default();
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state()?;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state()?.users.get(&user_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.state()?;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            phone_number: new_user.phone_number,
            password_hash: new_user.password_hash,
            is_active: true,
            email_confirmed: false,
            two_factor_enabled: false,
            two_factor_type: None,
            authenticator_key: None,
            security_stamp: User::new_security_stamp(),
            failed_login_count: 0,
            lockout_end: None,
            last_login_utc: None,
            created_utc: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_security_stamp(&self, user_id: Uuid) -> StoreResult<String> {
        let mut state = self.state()?;
        let user = Self::user_mut(&mut state, user_id)?;
        user.security_stamp = User::new_security_stamp();
        Ok(user.security_stamp.clone())
    }

    async fn record_failed_login(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lockout_end: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        let user = Self::user_mut(&mut state, user_id)?;
        user.failed_login_count += 1;
        if user.failed_login_count >= max_attempts {
            user.failed_login_count = 0;
            user.lockout_end = Some(lockout_end);
            return Ok(true);
        }
        Ok(false)
    }

    async fn reset_failed_logins(&self, user_id: Uuid) -> StoreResult<()> {
        let mut state = self.state()?;
        let user = Self::user_mut(&mut state, user_id)?;
        user.failed_login_count = 0;
        user.lockout_end = None;
        Ok(())
    }

    async fn update_last_login(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state()?;
        Self::user_mut(&mut state, user_id)?.last_login_utc = Some(now);
        Ok(())
    }

    async fn set_authenticator_key(&self, user_id: Uuid, key: &str) -> StoreResult<()> {
        let mut state = self.state()?;
        Self::user_mut(&mut state, user_id)?.authenticator_key = Some(key.to_string());
        Ok(())
    }

    async fn enable_two_factor(&self, user_id: Uuid, channel: TwoFactorType) -> StoreResult<()> {
        let mut state = self.state()?;
        let user = Self::user_mut(&mut state, user_id)?;
        user.two_factor_enabled = true;
        user.two_factor_type = Some(channel);
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert(&self, token: RefreshToken) -> StoreResult<()> {
        self.state()?.refresh_tokens.push(token);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        let state = self.state()?;
        Ok(state
            .refresh_tokens
            .iter()
            .find(|t| hashes_match(Some(&t.token_hash), Some(token_hash)))
            .cloned())
    }

    async fn rotate(
        &self,
        old_hash: &str,
        now: DateTime<Utc>,
        replacement: RefreshToken,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        let Some(old) = state
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token_hash == old_hash && t.is_active_at(now))
        else {
            return Ok(false);
        };
        old.revoked_utc = Some(now);
        old.replaced_by = Some(replacement.id);
        state.refresh_tokens.push(replacement);
        Ok(true)
    }

    async fn revoke(&self, token_hash: &str, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && t.user_id == user_id && t.revoked_utc.is_none())
        {
            Some(token) => {
                token.revoked_utc = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state()?;
        let mut revoked = 0;
        for token in state
            .refresh_tokens
            .iter_mut()
            .filter(|t| t.user_id == user_id && t.revoked_utc.is_none())
        {
            token.revoked_utc = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn count_active_for_user(&self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let state = self.state()?;
        Ok(state
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.is_active_at(now))
            .count() as u64)
    }

    async fn purge_stale(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state()?;
        let initial = state.refresh_tokens.len();
        state
            .refresh_tokens
            .retain(|t| t.expiry_utc >= before && t.revoked_utc.map_or(true, |r| r >= before));
        Ok((initial - state.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl TwoFactorStore for MemoryStore {
    async fn issue(&self, challenge: TwoFactorChallenge, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state()?;
        let mut superseded = 0;
        for existing in state.challenges.iter_mut().filter(|c| {
            c.user_id == challenge.user_id
                && c.channel == challenge.channel
                && c.verified_utc.is_none()
                && c.superseded_utc.is_none()
        }) {
            existing.superseded_utc = Some(now);
            superseded += 1;
        }
        state.challenges.push(challenge);
        Ok(superseded)
    }

    async fn consume(
        &self,
        user_id: Uuid,
        channel: TwoFactorType,
        code_hash: Option<&str>,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.challenges.iter_mut().find(|c| {
            c.user_id == user_id
                && c.channel == channel
                && is_open(c, max_attempts, now)
                && hashes_match(c.code_hash.as_deref(), code_hash)
        }) {
            Some(challenge) => {
                challenge.verified_utc = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        channel: TwoFactorType,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        if let Some(challenge) = state
            .challenges
            .iter_mut()
            .find(|c| c.user_id == user_id && c.channel == channel && is_open(c, max_attempts, now))
        {
            challenge.attempt_count += 1;
            if challenge.attempt_count >= max_attempts {
                challenge.superseded_utc = Some(now);
            }
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state()?;
        let initial = state.challenges.len();
        state.challenges.retain(|c| c.expiry_utc >= now);
        Ok((initial - state.challenges.len()) as u64)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn find_device(&self, user_id: Uuid, device_id: &str) -> StoreResult<Option<Device>> {
        let state = self.state()?;
        Ok(state
            .devices
            .iter()
            .find(|d| d.user_id == user_id && d.device_id == device_id)
            .cloned())
    }

    async fn touch_device(
        &self,
        user_id: Uuid,
        context: &DeviceContext,
        trust_new: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Device> {
        let mut state = self.state()?;
        if let Some(device) = state
            .devices
            .iter_mut()
            .find(|d| d.user_id == user_id && d.device_id == context.device_id)
        {
            device.last_seen_utc = now;
            device.ip_address = context.ip_address.clone();
            device.user_agent = context.user_agent.clone();
            return Ok(device.clone());
        }

        let device = Device {
            id: Uuid::new_v4(),
            user_id,
            device_id: context.device_id.clone(),
            platform: context.platform.clone(),
            browser: context.browser.clone(),
            operating_system: context.operating_system.clone(),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            is_trusted: trust_new,
            first_seen_utc: now,
            last_seen_utc: now,
        };
        state.devices.push(device.clone());
        Ok(device)
    }

    async fn mark_trusted(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state
            .devices
            .iter_mut()
            .find(|d| d.user_id == user_id && d.device_id == device_id)
        {
            Some(device) => {
                device.is_trusted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn has_successful_access(&self, user_id: Uuid, device_id: &str) -> StoreResult<bool> {
        let state = self.state()?;
        Ok(state
            .login_history
            .iter()
            .any(|h| h.user_id == user_id && h.device_id == device_id && h.success))
    }

    async fn append_login_history(&self, entry: LoginHistoryEntry) -> StoreResult<()> {
        self.state()?.login_history.push(entry);
        Ok(())
    }

    async fn list_devices(&self, user_id: Uuid) -> StoreResult<Vec<Device>> {
        let state = self.state()?;
        let mut devices: Vec<Device> = state
            .devices
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_seen_utc.cmp(&a.last_seen_utc));
        Ok(devices)
    }

    async fn list_login_history(&self, user_id: Uuid, limit: i64) -> StoreResult<Vec<LoginHistoryEntry>> {
        let state = self.state()?;
        // Insertion order is chronological; walk it backwards.
        Ok(state
            .login_history
            .iter()
            .rev()
            .filter(|h| h.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone_number: None,
            password_hash: "hash".to_string(),
        }
    }

    fn token(user_id: Uuid, raw: &str, now: DateTime<Utc>) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: RefreshToken::hash_token(raw),
            jwt_id: Uuid::new_v4().to_string(),
            device_id: None,
            ip_address: None,
            user_agent: None,
            issued_utc: now,
            expiry_utc: now + Duration::days(7),
            revoked_utc: None,
            replaced_by: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com"), Utc::now()).await.unwrap();
        let err = store.create_user(new_user("A@X.com"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_failed_logins_lock_at_threshold() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com"), Utc::now()).await.unwrap();
        let until = Utc::now() + Duration::minutes(15);

        for _ in 0..4 {
            assert!(!store.record_failed_login(user.id, 5, until).await.unwrap());
        }
        assert!(store.record_failed_login(user.id, 5, until).await.unwrap());

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.failed_login_count, 0);
        assert_eq!(user.lockout_end, Some(until));
    }

    #[tokio::test]
    async fn test_rotate_only_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        store.insert(token(user_id, "old", now)).await.unwrap();

        let old_hash = RefreshToken::hash_token("old");
        assert!(store.rotate(&old_hash, now, token(user_id, "new1", now)).await.unwrap());
        assert!(!store.rotate(&old_hash, now, token(user_id, "new2", now)).await.unwrap());

        let old = store.find_by_hash(&old_hash).await.unwrap().unwrap();
        assert!(old.revoked_utc.is_some());
        assert!(old.replaced_by.is_some());
        assert!(store.find_by_hash(&RefreshToken::hash_token("new2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_stale_keeps_recent_rows() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();

        let mut expired = token(user_id, "expired", now - Duration::days(60));
        expired.expiry_utc = now - Duration::days(45);
        store.insert(expired).await.unwrap();
        store.insert(token(user_id, "live", now)).await.unwrap();

        let removed = store.purge_stale(now - Duration::days(30)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_active_for_user(user_id, now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_touch_device_never_lowers_trust() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let ctx = DeviceContext {
            device_id: "d1".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            platform: "Desktop".to_string(),
            browser: "Firefox".to_string(),
            operating_system: "Linux".to_string(),
        };
        let now = Utc::now();
        store.touch_device(user_id, &ctx, false, now).await.unwrap();
        assert!(store.mark_trusted(user_id, "d1").await.unwrap());

        let device = store.touch_device(user_id, &ctx, false, now).await.unwrap();
        assert!(device.is_trusted);
        assert_eq!(store.list_devices(user_id).await.unwrap().len(), 1);
    }
}
