use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{DeviceHints, TwoFactorType, UserProfile};
use crate::services::{AuthSession, AuthenticatorEnrollment};
use crate::utils::validate_password_strength;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Secret1!")]
    pub password: String,

    #[serde(default)]
    pub remember_me: bool,

    pub device_info: Option<DeviceHints>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(custom(function = "validate_password_strength"))]
    #[schema(example = "Secret1!", min_length = 8)]
    pub password: String,

    #[validate(length(min = 1, message = "Password confirmation is required"))]
    #[schema(example = "Secret1!")]
    pub confirm_password: String,

    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    #[schema(example = "John")]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    #[schema(example = "Doe")]
    pub last_name: String,

    #[serde(default)]
    pub accept_terms: bool,

    #[validate(length(max = 32, message = "Phone number is too long"))]
    pub phone_number: Option<String>,

    pub device_info: Option<DeviceHints>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,

    pub device_info: Option<DeviceHints>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// Omit to sign out everywhere
    #[validate(length(min = 1, message = "Refresh token must not be empty"))]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    pub user_id: Uuid,

    #[validate(length(min = 1, max = 16, message = "Verification code is required"))]
    #[schema(example = "123456")]
    pub token: String,

    #[serde(rename = "type")]
    pub channel: TwoFactorType,

    #[serde(default)]
    pub remember_me: bool,

    pub device_info: Option<DeviceHints>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendTwoFactorRequest {
    pub user_id: Uuid,

    #[serde(rename = "type")]
    pub channel: Option<TwoFactorType>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmAuthenticatorRequest {
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    #[schema(example = "123456")]
    pub code: String,
}

/// Body of a successful sign-in, or of a sign-in waiting for its second factor.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub requires_two_factor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_factor_type: Option<TwoFactorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub is_new_device: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            access_token: Some(session.tokens.access_token),
            refresh_token: Some(session.tokens.refresh_token),
            token_type: Some(session.tokens.token_type),
            access_token_expires_at: Some(session.tokens.access_token_expires_at),
            refresh_token_expires_at: Some(session.tokens.refresh_token_expires_at),
            requires_two_factor: false,
            two_factor_type: None,
            user_id: Some(session.user.id),
            is_new_device: session.is_new_device,
            user: Some(session.user),
        }
    }
}

impl AuthResponse {
    pub fn two_factor_pending(user_id: Uuid, channel: TwoFactorType) -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            token_type: None,
            access_token_expires_at: None,
            refresh_token_expires_at: None,
            requires_two_factor: true,
            two_factor_type: Some(channel),
            user_id: Some(user_id),
            is_new_device: false,
            user: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorEnrollmentResponse {
    pub secret: String,
    #[schema(example = "otpauth://totp/AutoParts%20Ecommerce:user%40example.com?secret=...")]
    pub uri: String,
    #[schema(example = "JBSW Y3DP EHPK 3PXP")]
    pub manual_entry_key: String,
}

impl From<AuthenticatorEnrollment> for AuthenticatorEnrollmentResponse {
    fn from(e: AuthenticatorEnrollment) -> Self {
        Self {
            secret: e.secret,
            uri: e.uri,
            manual_entry_key: e.manual_entry_key,
        }
    }
}
