use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use service_core::{error::AppError, middleware::tracing::CorrelationId, response::ApiResponse};

use crate::{
    dtos::{
        AuthResponse, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest,
        SendTwoFactorRequest, VerifyTwoFactorRequest,
    },
    handlers::context::ClientInfo,
    middleware::AuthUser,
    services::AuthError,
    utils::{OptionalValidatedJson, ValidatedJson},
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, or second factor required", body = AuthResponse),
        (status = 400, description = "Validation error, account inactive or locked"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = client.device_context(req.device_info.as_ref());

    match state
        .auth
        .login(&req, &device, &correlation_id, Utc::now())
        .await
    {
        Ok(session) => Ok(Json(ApiResponse::ok(
            AuthResponse::from(session),
            "Login successful",
        ))),
        Err(AuthError::TwoFactorRequired { user_id, channel }) => Ok(Json(ApiResponse::ok(
            AuthResponse::two_factor_pending(user_id, channel),
            "Two-factor authentication required",
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Register a new account and sign it in
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation error or email already registered"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = client.device_context(req.device_info.as_ref());
    let session = state
        .auth
        .register(&req, &device, &correlation_id, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            AuthResponse::from(session),
            "Registration successful",
        )),
    ))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = crate::services::TokenPair),
        (status = 401, description = "Invalid or expired refresh token"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = client.device_context(req.device_info.as_ref());
    let tokens = state
        .auth
        .refresh(&req.refresh_token, &device, &correlation_id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(tokens, "Token refreshed successfully")))
}

/// Logout; revokes one refresh token or, without one, all of them
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out successfully"),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    user: AuthUser,
    OptionalValidatedJson(body): OptionalValidatedJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.unwrap_or_default();

    state
        .auth
        .logout(
            user.id()?,
            req.refresh_token.as_deref(),
            &correlation_id,
            Utc::now(),
        )
        .await?;

    Ok(Json(ApiResponse::message("Logged out successfully")))
}

/// Complete a sign-in with a two-factor code
#[utoipa::path(
    post,
    path = "/auth/verify-2fa",
    request_body = VerifyTwoFactorRequest,
    responses(
        (status = 200, description = "Two-factor verified", body = AuthResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid or expired verification code"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Two-Factor"
)]
pub async fn verify_two_factor(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<VerifyTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = client.device_context(req.device_info.as_ref());
    let session = state
        .auth
        .verify_two_factor(&req, &device, &correlation_id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::ok(
        AuthResponse::from(session),
        "Two-factor authentication successful",
    )))
}

/// Re-send a two-factor code
#[utoipa::path(
    post,
    path = "/auth/send-2fa",
    request_body = SendTwoFactorRequest,
    responses(
        (status = 200, description = "Code sent if the account uses two-factor"),
        (status = 400, description = "Validation error"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Two-Factor"
)]
pub async fn send_two_factor(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    ValidatedJson(req): ValidatedJson<SendTwoFactorRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .send_two_factor(req.user_id, req.channel, &correlation_id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::message(
        "If the account uses two-factor authentication, a new code has been sent",
    )))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = crate::models::UserProfile),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth.me(user.id()?).await?;
    Ok(Json(ApiResponse::ok(profile, "User retrieved successfully")))
}
