pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::IdentityConfig;
use crate::handlers::context::DEVICE_ID_HEADER;
use crate::middleware::{auth_middleware, metrics_middleware};
use crate::services::{
    AuthPolicy, AuthService, CodeDispatcher, DeviceTracker, PermissionCatalog, TokenService,
    TwoFactorService,
};
use crate::store::{CredentialStore, Stores};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::register,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::verify_two_factor,
        handlers::auth::send_two_factor,
        handlers::auth::me,
        handlers::two_factor::enroll_authenticator,
        handlers::two_factor::confirm_authenticator,
        handlers::devices::list_devices,
        handlers::devices::trust_device,
        handlers::devices::login_history,
    ),
    components(
        schemas(
            dtos::auth::LoginRequest,
            dtos::auth::RegisterRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::VerifyTwoFactorRequest,
            dtos::auth::SendTwoFactorRequest,
            dtos::auth::ConfirmAuthenticatorRequest,
            dtos::auth::AuthResponse,
            dtos::auth::AuthenticatorEnrollmentResponse,
            services::TokenPair,
            models::DeviceHints,
            models::Device,
            models::LoginHistoryEntry,
            models::TwoFactorType,
            models::UserProfile,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Credential login, registration and token rotation"),
        (name = "Two-Factor", description = "Second-factor challenges and authenticator enrollment"),
        (name = "Devices", description = "Known devices and sign-in history"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub auth: AuthService,
    pub tokens: TokenService,
    pub devices: DeviceTracker,
    pub users: Arc<dyn CredentialStore>,
}

impl AppState {
    /// Wires the engines over one set of stores.
    pub fn new(
        config: IdentityConfig,
        stores: Stores,
        dispatcher: Arc<dyn CodeDispatcher>,
    ) -> Result<Self, AppError> {
        let catalog = Arc::new(PermissionCatalog::default());
        let devices = DeviceTracker::new(stores.devices.clone(), config.policy.trust_new_devices);

        let tokens = TokenService::new(
            &config.jwt,
            catalog,
            stores.users.clone(),
            stores.refresh_tokens.clone(),
            devices.clone(),
        )
        .map_err(AppError::ConfigError)?;

        let two_factor =
            TwoFactorService::new(stores.two_factor.clone(), dispatcher, &config.two_factor);

        let auth = AuthService::new(
            stores.users.clone(),
            tokens.clone(),
            two_factor,
            devices.clone(),
            AuthPolicy::from_config(&config),
        );

        Ok(Self {
            config,
            auth,
            tokens,
            devices,
            users: stores.users,
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(DEVICE_ID_HEADER),
            HeaderName::from_static("x-request-id"),
        ]);

    // Rejected in production by config validation
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/auth/2fa/authenticator",
            post(handlers::two_factor::enroll_authenticator),
        )
        .route(
            "/auth/2fa/authenticator/confirm",
            post(handlers::two_factor::confirm_authenticator),
        )
        .route("/auth/devices", get(handlers::devices::list_devices))
        .route(
            "/auth/devices/:device_id/trust",
            post(handlers::devices::trust_device),
        )
        .route("/auth/login-history", get(handlers::devices::login_history))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Keep the OpenAPI JSON reachable for programmatic clients
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/verify-2fa", post(handlers::auth::verify_two_factor))
        .route("/auth/send-2fa", post(handlers::auth::send_two_factor))
        .merge(protected_routes)
        // route_layer so only matched routes are labelled
        .route_layer(from_fn(metrics_middleware))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.ping().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
