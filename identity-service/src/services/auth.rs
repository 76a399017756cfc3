//! Authentication orchestrator.
//!
//! `Unauthenticated -> [password] -> TwoFactorPending | Authenticated`,
//! `TwoFactorPending -> [code] -> Authenticated`. Tokens are only minted on
//! the final transition; every failure leaves the caller unauthenticated.

use chrono::{DateTime, Duration, Utc};
use service_core::middleware::tracing::CorrelationId;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::device::DeviceTracker;
use super::dispatch::DispatchStatus;
use super::error::AuthError;
use super::metrics::record_auth_event;
use super::token::{TokenPair, TokenService};
use super::two_factor::{verify_totp, AuthenticatorEnrollment, TwoFactorService};
use crate::config::IdentityConfig;
use crate::dtos::{LoginRequest, RegisterRequest, VerifyTwoFactorRequest};
use crate::models::{DeviceContext, NewUser, TwoFactorType, User, UserProfile};
use crate::store::{CredentialStore, StoreError};
use crate::utils::{field_error, hash_password, Password};

/// Account rules applied during sign-in and registration.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub max_failed_attempts: i32,
    pub lockout_duration: Duration,
    pub default_role: String,
    pub allow_unconfirmed_email_login: bool,
}

impl AuthPolicy {
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self {
            max_failed_attempts: config.lockout.max_failed_attempts,
            lockout_duration: Duration::minutes(config.lockout.duration_minutes),
            default_role: config.policy.default_role.clone(),
            allow_unconfirmed_email_login: config.policy.allow_unconfirmed_email_login,
        }
    }
}

/// Outcome of a completed sign-in.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub tokens: TokenPair,
    pub user: UserProfile,
    pub is_new_device: bool,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    tokens: TokenService,
    two_factor: TwoFactorService,
    devices: DeviceTracker,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        tokens: TokenService,
        two_factor: TwoFactorService,
        devices: DeviceTracker,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users,
            tokens,
            two_factor,
            devices,
            policy,
        }
    }

    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn login(
        &self,
        req: &LoginRequest,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let result = self.login_inner(req, device, correlation_id, now).await;
        record_auth_event("login", outcome_label(&result));
        result
    }

    async fn login_inner(
        &self,
        req: &LoginRequest,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let Some(user) = self.users.find_by_email(req.email.trim()).await? else {
            tracing::info!("Login attempt for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active {
            self.record_failure(&user, device, "AccountInactive", correlation_id, now)
                .await?;
            return Err(AuthError::AccountInactive);
        }

        if user.is_locked_at(now) {
            self.record_failure(&user, device, "AccountLocked", correlation_id, now)
                .await?;
            return Err(AuthError::AccountLocked);
        }

        let password = Password::new(req.password.clone());
        if !self.users.verify_password(&user, &password).await? {
            let locked = self
                .users
                .record_failed_login(
                    user.id,
                    self.policy.max_failed_attempts,
                    now + self.policy.lockout_duration,
                )
                .await?;
            self.record_failure(&user, device, "InvalidCredentials", correlation_id, now)
                .await?;

            if locked {
                tracing::warn!(user_id = %user.id, "Account locked after repeated failures");
                return Err(AuthError::AccountLocked);
            }
            return Err(AuthError::InvalidCredentials);
        }

        if !user.email_confirmed && !self.policy.allow_unconfirmed_email_login {
            self.record_failure(&user, device, "EmailNotConfirmed", correlation_id, now)
                .await?;
            return Err(AuthError::EmailNotConfirmed);
        }

        self.users.reset_failed_logins(user.id).await?;

        if user.two_factor_enabled {
            let channel = user.two_factor_type.unwrap_or(TwoFactorType::Email);
            let status = self.two_factor.generate_and_send(&user, channel, now).await?;
            if status == DispatchStatus::Failed {
                tracing::warn!(user_id = %user.id, channel = %channel, "Two-factor code not delivered");
            }
            tracing::info!(user_id = %user.id, "Password verified, awaiting second factor");
            return Err(AuthError::TwoFactorRequired {
                user_id: user.id,
                channel,
            });
        }

        self.complete_sign_in(user, device, req.remember_me, correlation_id, now)
            .await
    }

    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn register(
        &self,
        req: &RegisterRequest,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let result = self.register_inner(req, device, correlation_id, now).await;
        record_auth_event("register", outcome_label(&result));
        result
    }

    async fn register_inner(
        &self,
        req: &RegisterRequest,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        req.validate()?;

        if req.password != req.confirm_password {
            return Err(field_error(
                "confirmPassword",
                "password_mismatch",
                "Passwords do not match",
            )
            .into());
        }

        if !req.accept_terms {
            return Err(field_error(
                "acceptTerms",
                "terms_required",
                "You must accept the terms and conditions",
            )
            .into());
        }

        let email = req.email.trim();
        if self.users.find_by_email(email).await?.is_some() {
            return Err(duplicate_email());
        }

        let password_hash = hash_password(&Password::new(req.password.clone()))?;

        let user = match self
            .users
            .create_user(
                NewUser {
                    email: email.to_string(),
                    first_name: req.first_name.trim().to_string(),
                    last_name: req.last_name.trim().to_string(),
                    phone_number: req.phone_number.clone().filter(|p| !p.trim().is_empty()),
                    password_hash: password_hash.into_string(),
                },
                now,
            )
            .await
        {
            Ok(user) => user,
            Err(StoreError::DuplicateEmail) => return Err(duplicate_email()),
            Err(e) => return Err(e.into()),
        };

        if !self.tokens.catalog().is_known_role(&self.policy.default_role) {
            tracing::warn!(role = %self.policy.default_role, "Default role grants no permissions");
        }
        self.users.assign_role(user.id, &self.policy.default_role).await?;

        tracing::info!(user_id = %user.id, "User registered");

        self.complete_sign_in(user, device, false, correlation_id, now)
            .await
    }

    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let result = self
            .tokens
            .refresh_token_pair(refresh_token, device, correlation_id, now)
            .await;
        record_auth_event("refresh", outcome_label(&result));
        result
    }

    /// Revokes the given refresh token, or every token of the user when none
    /// is given. Both paths rotate the security stamp.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, correlation_id = %correlation_id))]
    pub async fn logout(
        &self,
        user_id: Uuid,
        refresh_token: Option<&str>,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        match refresh_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                self.tokens.revoke_token(token, user_id, now).await?;
                self.users.update_security_stamp(user_id).await?;
            }
            None => {
                self.tokens.revoke_all_for_user(user_id, now).await?;
            }
        }

        record_auth_event("logout", "success");
        tracing::info!("User logged out");
        Ok(())
    }

    /// Unknown users, inactive accounts and wrong codes all fail the same way.
    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn verify_two_factor(
        &self,
        req: &VerifyTwoFactorRequest,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let result = self.verify_two_factor_inner(req, device, correlation_id, now).await;
        record_auth_event("verify_2fa", outcome_label(&result));
        result
    }

    async fn verify_two_factor_inner(
        &self,
        req: &VerifyTwoFactorRequest,
        device: &DeviceContext,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let user = self
            .users
            .find_by_id(req.user_id)
            .await?
            .filter(|u| u.is_active && !u.is_locked_at(now))
            .ok_or(AuthError::InvalidTwoFactorCode)?;

        if let Err(e) = self.two_factor.verify(&user, &req.token, req.channel, now).await {
            self.record_failure(&user, device, "InvalidTwoFactorCode", correlation_id, now)
                .await?;
            return Err(e);
        }

        self.complete_sign_in(user, device, req.remember_me, correlation_id, now)
            .await
    }

    /// Re-sends a login code. Always succeeds from the caller's point of view.
    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn send_two_factor(
        &self,
        user_id: Uuid,
        channel: Option<TwoFactorType>,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let Some(user) = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active && u.two_factor_enabled)
        else {
            return Ok(());
        };

        let channel = channel
            .or(user.two_factor_type)
            .unwrap_or(TwoFactorType::Email);

        // Authenticator challenges only come from a verified password step
        if !channel.is_dispatched() {
            return Ok(());
        }

        let status = self.two_factor.generate_and_send(&user, channel, now).await?;
        tracing::info!(user_id = %user.id, channel = %channel, ?status, "Two-factor code re-sent");
        Ok(())
    }

    pub async fn enroll_authenticator(&self, user_id: Uuid) -> Result<AuthenticatorEnrollment, AuthError> {
        let user = self.active_user(user_id).await?;
        let enrollment = self.two_factor.enroll_authenticator(&user.email)?;
        self.users.set_authenticator_key(user.id, &enrollment.secret).await?;
        tracing::info!(user_id = %user.id, "Authenticator enrollment started");
        Ok(enrollment)
    }

    /// Enables authenticator two-factor once the user proves the app works.
    pub async fn confirm_authenticator(
        &self,
        user_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, AuthError> {
        let user = self.active_user(user_id).await?;
        let unix_time = u64::try_from(now.timestamp()).unwrap_or_default();

        let valid = user
            .authenticator_key
            .as_deref()
            .is_some_and(|key| verify_totp(key, code.trim(), unix_time));
        if !valid {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.users
            .enable_two_factor(user.id, TwoFactorType::Authenticator)
            .await?;
        tracing::info!(user_id = %user.id, "Authenticator two-factor enabled");
        self.me(user.id).await
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        let user = self.active_user(user_id).await?;
        let roles = self.users.get_roles(user.id).await?;
        Ok(UserProfile::from_user(&user, roles))
    }

    async fn active_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::Unauthorized)
    }

    async fn complete_sign_in(
        &self,
        mut user: User,
        device: &DeviceContext,
        remember_me: bool,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, AuthError> {
        let is_new_device = self.devices.is_new_device(user.id, &device.device_id).await?;

        let tokens = self
            .tokens
            .issue_token_pair(&user, device, remember_me, correlation_id, now)
            .await?;

        let recorded = async {
            self.devices
                .record_access(user.id, device, true, None, correlation_id, now)
                .await?;
            self.users.update_last_login(user.id, now).await?;
            self.users.get_roles(user.id).await
        }
        .await;

        // Tokens never reached the caller; leave no active refresh token behind
        let roles = match recorded {
            Ok(roles) => roles,
            Err(e) => {
                if let Err(revoke_err) = self
                    .tokens
                    .revoke_token(&tokens.refresh_token, user.id, now)
                    .await
                {
                    tracing::error!(
                        user_id = %user.id,
                        token_id = %tokens.token_id,
                        error = %revoke_err,
                        "Failed to revoke refresh token of an aborted sign-in"
                    );
                }
                return Err(e.into());
            }
        };
        user.last_login_utc = Some(now);

        tracing::info!(
            user_id = %user.id,
            device_id = %device.device_id,
            is_new_device,
            "User authenticated"
        );

        Ok(AuthSession {
            tokens,
            user: UserProfile::from_user(&user, roles),
            is_new_device,
        })
    }

    async fn record_failure(
        &self,
        user: &User,
        device: &DeviceContext,
        reason: &str,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.devices
            .record_access(user.id, device, false, Some(reason), correlation_id, now)
            .await?;
        Ok(())
    }
}

fn duplicate_email() -> AuthError {
    field_error("email", "duplicate_email", "Email is already registered").into()
}

fn outcome_label<T>(result: &Result<T, AuthError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AuthError::InvalidCredentials) => "invalid_credentials",
        Err(AuthError::AccountInactive) => "account_inactive",
        Err(AuthError::AccountLocked) => "account_locked",
        Err(AuthError::EmailNotConfirmed) => "email_not_confirmed",
        Err(AuthError::TwoFactorRequired { .. }) => "two_factor_required",
        Err(AuthError::InvalidTwoFactorCode) => "invalid_two_factor_code",
        Err(AuthError::InvalidOrExpiredRefreshToken) => "invalid_refresh_token",
        Err(AuthError::Unauthorized) => "unauthorized",
        Err(AuthError::Validation(_)) => "validation_failed",
        Err(AuthError::Internal(_)) => "error",
    }
}
