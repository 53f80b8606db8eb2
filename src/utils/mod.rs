// Utility modules for the auth service core

pub mod auth_errors;
pub mod device_fingerprint;
pub mod password;
pub mod recovery_codes;
pub mod validation;

pub use auth_errors::{AuthError, FailureReason};
pub use device_fingerprint::{fingerprint, normalize_device, DeviceInfo};
pub use password::{hash_password, verify_password, PasswordError};
pub use recovery_codes::{generate_recovery_code, generate_recovery_codes, RECOVERY_CODE_LEN};
pub use validation::{classify_identifier, validate_password_strength, IdentifierKind};
