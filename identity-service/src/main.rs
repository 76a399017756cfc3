use identity_service::{
    build_router,
    config::{IdentityConfig, StorageBackend},
    db,
    services::{CleanupWorker, EmailService, OutOfBandDispatcher, SmsGateway},
    store::Stores,
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::{init_tracing, shutdown_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    identity_service::services::metrics::init_metrics()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to register metrics: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        storage = ?config.storage,
        "Starting identity service"
    );

    let stores = match config.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.database)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
            Stores::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; all state is lost on restart");
            Stores::memory()
        }
    };

    let email = EmailService::new(&config.smtp).map_err(AppError::ConfigError)?;
    let sms = SmsGateway::new(config.sms.clone()).map_err(AppError::ConfigError)?;
    if !sms.is_configured() {
        tracing::warn!("SMS gateway is not configured; SMS codes will not be delivered");
    }
    let dispatcher = Arc::new(OutOfBandDispatcher::new(email, sms));

    let cleanup = Arc::new(CleanupWorker::new(
        &config.cleanup,
        stores.two_factor.clone(),
        stores.refresh_tokens.clone(),
    ));
    let cleanup_handle = cleanup.clone().start();

    let state = AppState::new(config.clone(), stores, dispatcher)?;
    let app = build_router(state).await?;

    let addr = config.common.bind_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cleanup.shutdown();
    if let Err(e) = cleanup_handle.await {
        tracing::error!(error = %e, "Cleanup worker terminated abnormally");
    }

    tracing::info!("Service shutdown complete");
    shutdown_tracing();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
