//! HTTP handlers for identity-service.

pub mod auth;
pub mod context;
pub mod devices;
pub mod metrics;
pub mod two_factor;

pub use auth::*;
pub use context::ClientInfo;
pub use devices::*;
pub use two_factor::*;
