use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TwoFactorType;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account is locked. Please try again later")]
    AccountLocked,

    #[error("Email address has not been confirmed")]
    EmailNotConfirmed,

    #[error("Two-factor authentication required")]
    TwoFactorRequired {
        user_id: Uuid,
        channel: TwoFactorType,
    },

    #[error("Invalid or expired verification code")]
    InvalidTwoFactorCode,

    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredRefreshToken,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(anyhow::Error::new(err))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidTwoFactorCode
            | AuthError::InvalidOrExpiredRefreshToken
            | AuthError::Unauthorized => AppError::AuthError(anyhow::anyhow!(err.to_string())),
            AuthError::AccountInactive
            | AuthError::AccountLocked
            | AuthError::EmailNotConfirmed => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            // Handlers answer this one themselves; reaching here means a route
            // that cannot continue a pending sign-in.
            AuthError::TwoFactorRequired { .. } => {
                AppError::AuthError(anyhow::anyhow!(err.to_string()))
            }
            AuthError::Validation(e) => AppError::ValidationError(e),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    fn status_of(err: AuthError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::InvalidTwoFactorCode), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AuthError::InvalidOrExpiredRefreshToken),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(AuthError::AccountLocked), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AuthError::AccountInactive), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AuthError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_become_internal() {
        let err: AuthError = StoreError::Poisoned.into();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
