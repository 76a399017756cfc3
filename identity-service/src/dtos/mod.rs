pub mod auth;

pub use auth::{
    AuthResponse, AuthenticatorEnrollmentResponse, ConfirmAuthenticatorRequest, LoginRequest,
    LogoutRequest, RefreshRequest, RegisterRequest, SendTwoFactorRequest, VerifyTwoFactorRequest,
};
