//! Device and login-history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Client-supplied device description; every field optional.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHints {
    pub device_id: Option<String>,
    pub platform: Option<String>,
    pub browser: Option<String>,
    #[serde(alias = "os")]
    pub operating_system: Option<String>,
}

/// Resolved description of the device a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub device_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub platform: String,
    pub browser: String,
    pub operating_system: String,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: String,
    pub browser: String,
    pub operating_system: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_trusted: bool,
    pub first_seen_utc: DateTime<Utc>,
    pub last_seen_utc: DateTime<Utc>,
}

/// Append-only audit of an authentication attempt.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub platform: String,
    pub browser: String,
    pub operating_system: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub correlation_id: Option<String>,
    pub occurred_utc: DateTime<Utc>,
}
