//! Two-factor challenge model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Delivery channel of a second factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TwoFactorType {
    #[serde(alias = "email", alias = "EMAIL")]
    Email,
    #[serde(alias = "SMS", alias = "sms")]
    Sms,
    #[serde(alias = "authenticator", alias = "totp", alias = "TOTP")]
    Authenticator,
}

impl TwoFactorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorType::Email => "email",
            TwoFactorType::Sms => "sms",
            TwoFactorType::Authenticator => "authenticator",
        }
    }

    /// Email and SMS codes are generated here and sent out of band.
    pub fn is_dispatched(&self) -> bool {
        !matches!(self, TwoFactorType::Authenticator)
    }
}

impl fmt::Display for TwoFactorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TwoFactorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(TwoFactorType::Email),
            "sms" => Ok(TwoFactorType::Sms),
            "authenticator" => Ok(TwoFactorType::Authenticator),
            other => Err(format!("unknown two-factor type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Issued,
    Verified,
    Superseded,
    Expired,
}

/// One-time challenge bound to a (user, channel) pair.
///
/// Authenticator challenges carry no code: they only record that the
/// password step succeeded and are consumed by a valid TOTP.
#[derive(Debug, Clone)]
pub struct TwoFactorChallenge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: TwoFactorType,
    pub code_hash: Option<String>,
    pub recipient: Option<String>,
    pub attempt_count: i32,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub verified_utc: Option<DateTime<Utc>>,
    pub superseded_utc: Option<DateTime<Utc>>,
}

impl TwoFactorChallenge {
    /// A code is still good at exactly `expiry_utc`.
    pub fn state_at(&self, now: DateTime<Utc>) -> ChallengeState {
        if self.verified_utc.is_some() {
            ChallengeState::Verified
        } else if self.superseded_utc.is_some() {
            ChallengeState::Superseded
        } else if now > self.expiry_utc {
            ChallengeState::Expired
        } else {
            ChallengeState::Issued
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_type_accepts_common_spellings() {
        let t: TwoFactorType = serde_json::from_str("\"SMS\"").unwrap();
        assert_eq!(t, TwoFactorType::Sms);
        let t: TwoFactorType = serde_json::from_str("\"Email\"").unwrap();
        assert_eq!(t, TwoFactorType::Email);
        assert_eq!("Authenticator".parse::<TwoFactorType>(), Ok(TwoFactorType::Authenticator));
    }

    #[test]
    fn test_state_transitions() {
        let issued = Utc::now();
        let mut challenge = TwoFactorChallenge {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            channel: TwoFactorType::Email,
            code_hash: Some("h".into()),
            recipient: None,
            attempt_count: 0,
            issued_utc: issued,
            expiry_utc: issued + Duration::minutes(5),
            verified_utc: None,
            superseded_utc: None,
        };

        assert_eq!(challenge.state_at(issued + Duration::minutes(5)), ChallengeState::Issued);
        assert_eq!(
            challenge.state_at(issued + Duration::minutes(5) + Duration::seconds(1)),
            ChallengeState::Expired
        );

        challenge.superseded_utc = Some(issued);
        assert_eq!(challenge.state_at(issued), ChallengeState::Superseded);
    }
}
