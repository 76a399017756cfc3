use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::{error::AppError, response::ApiResponse};
use utoipa::IntoParams;

use crate::{
    middleware::AuthUser,
    services::AuthError,
    AppState,
};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Entries to return, most recent first (default 50, max 200)
    pub limit: Option<i64>,
}

/// Devices the current user has signed in from
#[utoipa::path(
    get,
    path = "/auth/devices",
    responses(
        (status = 200, description = "Known devices", body = [crate::models::Device]),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "Devices",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let devices = state
        .devices
        .list_devices(user.id()?)
        .await
        .map_err(AuthError::from)?;
    Ok(Json(ApiResponse::ok(devices, "Devices retrieved successfully")))
}

/// Mark one of the current user's devices as trusted
#[utoipa::path(
    post,
    path = "/auth/devices/{device_id}/trust",
    params(
        ("device_id" = String, Path, description = "Client device identifier")
    ),
    responses(
        (status = 200, description = "Device trusted"),
        (status = 400, description = "Unknown device"),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "Devices",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn trust_device(
    State(state): State<AppState>,
    user: AuthUser,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.id()?;
    let found = state
        .devices
        .mark_trusted(user_id, &device_id)
        .await
        .map_err(AuthError::from)?;

    if !found {
        return Err(AppError::BadRequest(anyhow::anyhow!("Device not found")));
    }

    tracing::info!(user_id = %user_id, device_id = %device_id, "Device marked as trusted");
    Ok(Json(ApiResponse::message("Device trusted")))
}

/// Sign-in attempts of the current user, most recent first
#[utoipa::path(
    get,
    path = "/auth/login-history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Login history", body = [crate::models::LoginHistoryEntry]),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "Devices",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn login_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = state
        .devices
        .login_history(user.id()?, limit)
        .await
        .map_err(AuthError::from)?;
    Ok(Json(ApiResponse::ok(history, "Login history retrieved successfully")))
}
