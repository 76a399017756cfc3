use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use service_core::{error::AppError, response::ApiResponse};

use crate::{
    dtos::{AuthenticatorEnrollmentResponse, ConfirmAuthenticatorRequest},
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Start authenticator-app enrollment
#[utoipa::path(
    post,
    path = "/auth/2fa/authenticator",
    responses(
        (status = 200, description = "Enrollment secret issued", body = AuthenticatorEnrollmentResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "Two-Factor",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn enroll_authenticator(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.auth.enroll_authenticator(user.id()?).await?;
    Ok(Json(ApiResponse::ok(
        AuthenticatorEnrollmentResponse::from(enrollment),
        "Scan the QR code or enter the key in your authenticator app",
    )))
}

/// Confirm enrollment with a code from the app; enables two-factor
#[utoipa::path(
    post,
    path = "/auth/2fa/authenticator/confirm",
    request_body = ConfirmAuthenticatorRequest,
    responses(
        (status = 200, description = "Authenticator two-factor enabled"),
        (status = 401, description = "Invalid code or access token")
    ),
    tag = "Two-Factor",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn confirm_authenticator(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ConfirmAuthenticatorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .auth
        .confirm_authenticator(user.id()?, &req.code, Utc::now())
        .await?;
    Ok(Json(ApiResponse::ok(
        profile,
        "Authenticator two-factor authentication enabled",
    )))
}
