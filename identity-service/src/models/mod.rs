pub mod device;
pub mod refresh_token;
pub mod two_factor;
pub mod user;

pub use device::{Device, DeviceContext, DeviceHints, LoginHistoryEntry};
pub use refresh_token::RefreshToken;
pub use two_factor::{ChallengeState, TwoFactorChallenge, TwoFactorType};
pub use user::{NewUser, User, UserProfile};
