//! Principal model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::TwoFactorType;

/// User account as held by the credential store.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub email_confirmed: bool,
    pub two_factor_enabled: bool,
    pub two_factor_type: Option<TwoFactorType>,
    /// Base32 TOTP secret; present once enrollment started.
    pub authenticator_key: Option<String>,
    pub security_stamp: String,
    pub failed_login_count: i32,
    pub lockout_end: Option<DateTime<Utc>>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.is_some_and(|end| end > now)
    }

    pub fn new_security_stamp() -> String {
        Uuid::new_v4().simple().to_string().to_uppercase()
    }
}

/// Data needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
}

/// Sanitized user returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email_confirmed: bool,
    pub two_factor_enabled: bool,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub last_login_utc: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn from_user(user: &User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            email_confirmed: user.email_confirmed,
            two_factor_enabled: user.two_factor_enabled,
            is_active: user.is_active,
            roles,
            last_login_utc: user.last_login_utc,
        }
    }
}
