use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::config::SmsConfig;

/// HTTP SMS gateway client.
#[derive(Clone)]
pub struct SmsGateway {
    config: SmsConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    to: String,
    message: &'a str,
}

impl SmsGateway {
    pub fn new(config: SmsConfig) -> Result<Self, anyhow::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { config, client })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.gateway_url.is_empty() && !self.config.api_key.is_empty()
    }

    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), anyhow::Error> {
        if !self.is_configured() {
            anyhow::bail!("SMS gateway is not configured");
        }

        let normalized = normalize_phone(to);
        if normalized.is_empty() {
            anyhow::bail!("Phone number is empty");
        }

        let message = format!("Your verification code is {}. It expires in 5 minutes.", code);
        let response = self
            .client
            .post(&self.config.gateway_url)
            .bearer_auth(&self.config.api_key)
            .json(&SmsRequest {
                to: normalized,
                message: &message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "SMS gateway rejected message");
            anyhow::bail!("SMS gateway returned status {}", status);
        }

        tracing::info!("SMS sent successfully");
        Ok(())
    }
}

/// Keeps digits and a leading `+`.
fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (i == 0 && c == '+') {
            out.push(c);
        }
    }
    out
}
