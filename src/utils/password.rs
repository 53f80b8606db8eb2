// Password hashing and verification using bcrypt

use thiserror::Error;

/// Errors that can occur during password operations
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingError(String),

    #[error("Failed to verify password: {0}")]
    VerificationError(String),
}

/// Minimum bcrypt cost accepted for new hashes
pub const MIN_BCRYPT_COST: u32 = 10;

/// Hash a password with the given bcrypt cost. Costs below the minimum are
/// raised to it; weak work factors never reach storage.
pub fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    let cost = cost.max(MIN_BCRYPT_COST);
    bcrypt::hash(password, cost).map_err(|e| PasswordError::HashingError(e.to_string()))
}

/// Verify a password against a stored bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    bcrypt::verify(password, hash).map_err(|e| PasswordError::VerificationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // bcrypt's minimum work factor keeps these tests fast; production cost
    // comes from configuration.
    fn test_hash(password: &str) -> String {
        bcrypt::hash(password, 4u32).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = test_hash("MySecureP@ssw0rd");
        assert!(hash.starts_with("$2"));
        assert!(verify_password("MySecureP@ssw0rd", &hash).unwrap());
        assert!(!verify_password("WrongPassword", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hash1 = test_hash("SamePassword1");
        let hash2 = test_hash("SamePassword1");
        assert_ne!(hash1, hash2, "bcrypt salts must differ");
        assert!(verify_password("SamePassword1", &hash1).unwrap());
        assert!(verify_password("SamePassword1", &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(verify_password("password", "not_a_valid_hash").is_err());
    }
}
