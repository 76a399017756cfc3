pub mod password;
pub mod validation;

pub use password::{hash_password, validate_password_strength, verify_password, Password, PasswordHashString};
pub use validation::{field_error, OptionalValidatedJson, ValidatedJson};
