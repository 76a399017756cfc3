use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CleanupConfig;
use crate::store::{RefreshTokenStore, StoreResult, TwoFactorStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_challenges: u64,
    pub stale_refresh_tokens: u64,
}

/// Periodic sweep of expired two-factor challenges and long-dead refresh
/// tokens. Only strictly-expired rows are touched, so it runs alongside
/// live traffic.
pub struct CleanupWorker {
    two_factor: Arc<dyn TwoFactorStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    interval: std::time::Duration,
    retention: Duration,
    shutdown_token: CancellationToken,
}

impl CleanupWorker {
    pub fn new(
        config: &CleanupConfig,
        two_factor: Arc<dyn TwoFactorStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            two_factor,
            refresh_tokens,
            interval: std::time::Duration::from_secs(config.interval_seconds.max(1)),
            retention: Duration::days(config.refresh_token_retention_days),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> StoreResult<CleanupReport> {
        let expired_challenges = self.two_factor.purge_expired(now).await?;
        let stale_refresh_tokens = self.refresh_tokens.purge_stale(now - self.retention).await?;

        Ok(CleanupReport {
            expired_challenges,
            stale_refresh_tokens,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let shutdown = self.shutdown_token.clone();

        tracing::info!(interval_secs = self.interval.as_secs(), "Starting cleanup worker");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Cleanup worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.run_once(Utc::now()).await {
                            Ok(report) => tracing::info!(
                                expired_challenges = report.expired_challenges,
                                stale_refresh_tokens = report.stale_refresh_tokens,
                                "Cleanup sweep completed"
                            ),
                            Err(e) => tracing::error!(error = %e, "Cleanup sweep failed"),
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        tracing::info!("Initiating cleanup worker shutdown");
        self.shutdown_token.cancel();
    }
}
