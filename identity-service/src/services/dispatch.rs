//! Out-of-band delivery of verification codes.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::email::EmailService;
use super::sms::SmsGateway;
use crate::models::TwoFactorType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Delivered,
    Failed,
}

/// Only success or failure comes back; callers never see transport detail.
#[async_trait]
pub trait CodeDispatcher: Send + Sync {
    async fn send_email(&self, to: &str, code: &str) -> Result<(), anyhow::Error>;

    async fn send_sms(&self, to: &str, code: &str) -> Result<(), anyhow::Error>;
}

/// SMTP for email codes and the HTTP gateway for SMS.
pub struct OutOfBandDispatcher {
    email: EmailService,
    sms: SmsGateway,
}

impl OutOfBandDispatcher {
    pub fn new(email: EmailService, sms: SmsGateway) -> Self {
        Self { email, sms }
    }
}

#[async_trait]
impl CodeDispatcher for OutOfBandDispatcher {
    async fn send_email(&self, to: &str, code: &str) -> Result<(), anyhow::Error> {
        self.email.send_verification_code(to, code).await
    }

    async fn send_sms(&self, to: &str, code: &str) -> Result<(), anyhow::Error> {
        self.sms.send_verification_code(to, code).await
    }
}

#[derive(Debug, Clone)]
pub struct SentCode {
    pub channel: TwoFactorType,
    pub recipient: String,
    pub code: String,
}

/// Records every code instead of sending it.
#[derive(Clone, Default)]
pub struct MockDispatcher {
    sent: Arc<Mutex<Vec<SentCode>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        if let Ok(mut flag) = self.fail.lock() {
            *flag = fail;
        }
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_code_for(&self, recipient: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|s| s.recipient == recipient)
            .map(|s| s.code)
    }

    fn record(&self, channel: TwoFactorType, to: &str, code: &str) -> Result<(), anyhow::Error> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            anyhow::bail!("dispatch disabled");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mock dispatcher lock poisoned"))?
            .push(SentCode {
                channel,
                recipient: to.to_string(),
                code: code.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl CodeDispatcher for MockDispatcher {
    async fn send_email(&self, to: &str, code: &str) -> Result<(), anyhow::Error> {
        self.record(TwoFactorType::Email, to, code)
    }

    async fn send_sms(&self, to: &str, code: &str) -> Result<(), anyhow::Error> {
        self.record(TwoFactorType::Sms, to, code)
    }
}
