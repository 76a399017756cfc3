//! Services layer for identity-service.
//!
//! The authentication orchestrator and the engines it composes: permission
//! catalog, device trust, two-factor challenges and token issuance.

mod auth;
pub mod cleanup;
pub mod device;
pub mod dispatch;
mod email;
pub mod error;
mod jwt;
pub mod metrics;
pub mod permissions;
mod sms;
pub mod token;
pub mod two_factor;

pub use auth::{AuthPolicy, AuthService, AuthSession};
pub use cleanup::{CleanupReport, CleanupWorker};
pub use device::{build_device_context, parse_user_agent, DeviceTracker, UserAgentInfo};
pub use dispatch::{CodeDispatcher, DispatchStatus, MockDispatcher, OutOfBandDispatcher};
pub use email::EmailService;
pub use error::AuthError;
pub use jwt::{AccessTokenClaims, JwtService};
pub use permissions::PermissionCatalog;
pub use sms::SmsGateway;
pub use token::{TokenPair, TokenService};
pub use two_factor::{AuthenticatorEnrollment, TwoFactorService};
