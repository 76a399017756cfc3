//! Shared setup for identity-service integration tests.
//!
//! Everything runs against the in-memory store and a recording dispatcher,
//! so no database or SMTP server is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use identity_service::{
    build_router,
    config::{
        CleanupConfig, DatabaseConfig, Environment, IdentityConfig, JwtConfig, LockoutConfig,
        PolicyConfig, SecurityConfig, SmsConfig, SmtpConfig, StorageBackend, TwoFactorConfig,
    },
    dtos::{LoginRequest, RegisterRequest},
    models::{DeviceContext, DeviceHints},
    services::{build_device_context, AuthSession, MockDispatcher},
    store::Stores,
    AppState,
};
use serde_json::Value;
use service_core::middleware::tracing::CorrelationId;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_PASSWORD: &str = "Secret1!";
pub const TEST_JWT_SECRET: &str = "integration-test-signing-secret-0123456789abcdef";
pub const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        storage: StorageBackend::Memory,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            issuer: "identity-service".to_string(),
            audience: "autoparts-clients".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            remember_me_refresh_token_expiry_days: 30,
            clock_skew_seconds: 300,
        },
        lockout: LockoutConfig {
            max_failed_attempts: 5,
            duration_minutes: 15,
        },
        two_factor: TwoFactorConfig {
            code_ttl_seconds: 300,
            max_attempts: 5,
            totp_issuer: "AutoParts Ecommerce".to_string(),
        },
        policy: PolicyConfig {
            default_role: "Customer".to_string(),
            allow_unconfirmed_email_login: true,
            trust_new_devices: false,
        },
        cleanup: CleanupConfig {
            interval_seconds: 300,
            refresh_token_retention_days: 30,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            user: String::new(),
            password: String::new(),
            from: "no-reply@autoparts.local".to_string(),
        },
        sms: SmsConfig {
            gateway_url: String::new(),
            api_key: String::new(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger_enabled: false,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub stores: Stores,
    pub router: Router,
    pub dispatcher: MockDispatcher,
    pub correlation_id: CorrelationId,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: IdentityConfig) -> Self {
        Self::spawn_with_stores(config, Stores::memory()).await
    }

    pub async fn spawn_with_stores(config: IdentityConfig, stores: Stores) -> Self {
        let dispatcher = MockDispatcher::new();
        let state = AppState::new(config, stores.clone(), Arc::new(dispatcher.clone()))
            .expect("Failed to build app state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            state,
            stores,
            router,
            dispatcher,
            correlation_id: CorrelationId::new(),
        }
    }

    /// Registers an account through the orchestrator and returns its session.
    pub async fn register(&self, email: &str, now: DateTime<Utc>) -> AuthSession {
        self.state
            .auth
            .register(&register_request(email), &device("device-a"), &self.correlation_id, now)
            .await
            .expect("Registration failed")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response body is not JSON")
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, DESKTOP_CHROME_UA);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    serde_json::from_value(serde_json::json!({
        "email": email,
        "password": TEST_PASSWORD,
        "confirmPassword": TEST_PASSWORD,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "acceptTerms": true,
    }))
    .expect("Invalid register request")
}

pub fn login_request(email: &str, password: &str) -> LoginRequest {
    serde_json::from_value(serde_json::json!({
        "email": email,
        "password": password,
    }))
    .expect("Invalid login request")
}

pub fn device(device_id: &str) -> DeviceContext {
    build_device_context(
        Some(device_id),
        Some("203.0.113.7"),
        Some(DESKTOP_CHROME_UA),
        &DeviceHints::default(),
    )
}
