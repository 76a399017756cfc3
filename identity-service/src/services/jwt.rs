use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{DeviceContext, User};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT service for access-token signing and validation
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_expiry_minutes: i64,
    leeway_seconds: u64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email_confirmed: bool,
    pub two_factor_enabled: bool,
    pub is_active: bool,
    pub roles: Vec<String>,
    /// Union across roles, de-duplicated
    pub permissions: Vec<String>,
    pub device_id: String,
    pub ip_address: Option<String>,
    pub platform: String,
    pub is_trusted: bool,
    pub security_stamp: String,
    /// Correlates the access token with its refresh-token record
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl AccessTokenClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Inputs for one access token beyond the user record itself.
pub struct ClaimContext<'a> {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub device: &'a DeviceContext,
    pub is_trusted: bool,
    pub issued_at: DateTime<Utc>,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 bytes");
        }

        tracing::info!("JWT service initialized with HS256 signing key");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            leeway_seconds: config.clock_skew_seconds,
        })
    }

    pub fn build_claims(&self, user: &User, ctx: ClaimContext<'_>) -> AccessTokenClaims {
        let exp = ctx.issued_at + Duration::minutes(self.access_token_expiry_minutes);

        AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            email_confirmed: user.email_confirmed,
            two_factor_enabled: user.two_factor_enabled,
            is_active: user.is_active,
            roles: ctx.roles,
            permissions: ctx.permissions,
            device_id: ctx.device.device_id.clone(),
            ip_address: ctx.device.ip_address.clone(),
            platform: ctx.device.platform.clone(),
            is_trusted: ctx.is_trusted,
            security_stamp: user.security_stamp.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: ctx.issued_at.timestamp(),
            nbf: ctx.issued_at.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        }
    }

    pub fn encode_access_token(&self, claims: &AccessTokenClaims) -> Result<String, anyhow::Error> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Checks signature, issuer, audience and lifetime with the algorithm
    /// pinned to HS256. Every failure looks the same to the caller.
    pub fn validate_access_token(&self, token: &str) -> Option<AccessTokenClaims> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = self.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        match decode::<AccessTokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "Access token rejected");
                None
            }
        }
    }

    pub fn access_token_expiry_minutes(&self) -> i64 {
        self.access_token_expiry_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-signing-secret-0123456789abcdef".to_string(),
            issuer: "identity-service".to_string(),
            audience: "autoparts-clients".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            remember_me_refresh_token_expiry_days: 30,
            clock_skew_seconds: 0,
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone_number: None,
            password_hash: String::new(),
            is_active: true,
            email_confirmed: false,
            two_factor_enabled: false,
            two_factor_type: None,
            authenticator_key: None,
            security_stamp: User::new_security_stamp(),
            failed_login_count: 0,
            lockout_end: None,
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    fn device() -> DeviceContext {
        DeviceContext {
            device_id: "d1".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            platform: "Desktop".to_string(),
            browser: "Chrome".to_string(),
            operating_system: "Windows".to_string(),
        }
    }

    fn claims(service: &JwtService, issued_at: DateTime<Utc>) -> AccessTokenClaims {
        let device = device();
        service.build_claims(
            &user(),
            ClaimContext {
                roles: vec!["Customer".to_string()],
                permissions: vec!["orders.read".to_string()],
                device: &device,
                is_trusted: false,
                issued_at,
            },
        )
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut cfg = config();
        cfg.secret = "short".to_string();
        assert!(JwtService::new(&cfg).is_err());
    }

    #[test]
    fn test_access_token_generation_and_validation() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let claims = claims(&service, Utc::now());

        let token = service.encode_access_token(&claims)?;
        let decoded = service
            .validate_access_token(&token)
            .ok_or_else(|| anyhow::anyhow!("token should validate"))?;

        assert_eq!(decoded, claims);
        assert_eq!(decoded.device_id, "d1");
        assert!(decoded.has_permission("orders.read"));
        Ok(())
    }

    #[test]
    fn test_expired_token_rejected() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let token = service.encode_access_token(&claims(&service, Utc::now() - Duration::hours(1)))?;
        assert!(service.validate_access_token(&token).is_none());
        Ok(())
    }

    #[test]
    fn test_wrong_audience_and_issuer_rejected() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let mut c = claims(&service, Utc::now());
        c.aud = "someone-else".to_string();
        assert!(service.validate_access_token(&service.encode_access_token(&c)?).is_none());

        let mut c = claims(&service, Utc::now());
        c.iss = "forged".to_string();
        assert!(service.validate_access_token(&service.encode_access_token(&c)?).is_none());
        Ok(())
    }

    #[test]
    fn test_algorithm_confusion_rejected() -> Result<(), anyhow::Error> {
        let cfg = config();
        let service = JwtService::new(&cfg)?;
        let c = claims(&service, Utc::now());

        let hs512 = encode(
            &Header::new(Algorithm::HS512),
            &c,
            &EncodingKey::from_secret(cfg.secret.as_bytes()),
        )?;
        assert!(service.validate_access_token(&hs512).is_none());

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&c)?);
        let unsigned = format!("{}.{}.", header, payload);
        assert!(service.validate_access_token(&unsigned).is_none());
        Ok(())
    }

    #[test]
    fn test_tampered_signature_rejected() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let other = JwtService::new(&JwtConfig {
            secret: "another-signing-secret-0123456789abcdef".to_string(),
            ..config()
        })?;
        let token = other.encode_access_token(&claims(&other, Utc::now()))?;
        assert!(service.validate_access_token(&token).is_none());
        Ok(())
    }
}
