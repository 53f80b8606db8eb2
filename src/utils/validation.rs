// Login identifier classification and credential validation

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{6,15}$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{3,64}$").unwrap();
}

/// What kind of identifier the caller supplied at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Email,
    Phone,
    Username,
}

/// Classify a login identifier. Anything that is neither a plausible email
/// nor a phone number is treated as a username.
pub fn classify_identifier(identifier: &str) -> IdentifierKind {
    let identifier = identifier.trim();
    if EMAIL_RE.is_match(identifier) {
        IdentifierKind::Email
    } else if PHONE_RE.is_match(identifier) {
        IdentifierKind::Phone
    } else {
        IdentifierKind::Username
    }
}

/// Check whether a string is a well-formed username.
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Check whether a string is a well-formed phone number.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Password policy: at least 8 characters with upper case, lower case and a
/// digit.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_upper || !has_lower || !has_digit {
        return Err(
            "Password must contain upper case, lower case and numeric characters".to_string(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_identifier() {
        assert_eq!(
            classify_identifier("user@suoke.life"),
            IdentifierKind::Email
        );
        assert_eq!(classify_identifier("+8613912345678"), IdentifierKind::Phone);
        assert_eq!(classify_identifier("13912345678"), IdentifierKind::Phone);
        assert_eq!(classify_identifier("zhang_wei"), IdentifierKind::Username);
        assert_eq!(classify_identifier("  user@suoke.life "), IdentifierKind::Email);
    }

    #[test]
    fn test_username_validation() {
        assert!(is_valid_username("zhang_wei"));
        assert!(is_valid_username("abc"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("has-dash!"));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+8613912345678"));
        assert!(is_valid_phone("13912345678"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("phone-number"));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Str0ngEnough").is_ok());
        assert!(validate_password_strength("short1A").is_err());
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
    }
}
