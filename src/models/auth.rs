// JWT claim structures for the three token kinds minted by the service.
// Wire layout is fixed: the discriminator field serializes as `type`.

use serde::{Deserialize, Serialize};

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";
pub const TOKEN_TYPE_RESET: &str = "reset";

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,

    /// Primary role of the user
    pub role: String,

    /// Optional snapshot of the permission set at issue time. Authorization
    /// decisions always re-resolve; this is informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,

    /// Token kind discriminator ("access")
    #[serde(rename = "type")]
    pub token_type: String,

    /// Issued at timestamp (Unix epoch seconds)
    pub iat: u64,

    /// Expires at timestamp (Unix epoch seconds)
    pub exp: u64,

    /// JWT ID for revocation (UUID format)
    pub jti: String,

    /// Token issuer identifier
    pub iss: String,

    /// Expected audience
    pub aud: String,

    /// Bound session id, when issued inside a session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Bound device id, when a device was identified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

/// Refresh token claims - minimal payload for rotation and revocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    pub sub: String,

    #[serde(rename = "type")]
    pub token_type: String,

    pub iat: u64,
    pub exp: u64,
    pub jti: String,
    pub iss: String,
    pub aud: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

/// Password reset token claims - single use, short lived
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetTokenClaims {
    pub sub: String,
    pub email: String,

    #[serde(rename = "type")]
    pub token_type: String,

    pub iat: u64,
    pub exp: u64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn access_claims() -> AccessTokenClaims {
        AccessTokenClaims {
            sub: "u1".to_string(),
            role: "knowledge_reader".to_string(),
            permissions: Some(vec!["knowledge:read".to_string()]),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            iat: 1_700_000_000,
            exp: 1_700_086_400,
            jti: Uuid::new_v4().to_string(),
            iss: "suoke-auth-service".to_string(),
            aud: "https://suoke.life".to_string(),
            sid: Some(Uuid::new_v4().to_string()),
            did: None,
        }
    }

    #[test]
    fn test_type_field_serializes_as_type() {
        let json = serde_json::to_value(access_claims()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.get("type").and_then(|v| v.as_str()), Some("access"));
        assert!(!obj.contains_key("token_type"));
        // absent optionals are omitted from the wire form
        assert!(!obj.contains_key("did"));
    }

    #[test]
    fn test_access_claims_round_trip() {
        let claims = access_claims();
        let json = serde_json::to_string(&claims).unwrap();
        let decoded: AccessTokenClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(claims, decoded);
    }

    #[test]
    fn test_refresh_claims_round_trip() {
        let claims = RefreshTokenClaims {
            sub: "u2".to_string(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            iat: 1_700_000_000,
            exp: 1_700_604_800,
            jti: Uuid::new_v4().to_string(),
            iss: "suoke-auth-service".to_string(),
            aud: "https://suoke.life".to_string(),
            sid: None,
            did: None,
        };
        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"type\":\"refresh\""));
        let decoded: RefreshTokenClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(claims, decoded);
    }

    #[test]
    fn test_reset_claims_expiry_window() {
        let claims = ResetTokenClaims {
            sub: "u3".to_string(),
            email: "u3@suoke.life".to_string(),
            token_type: TOKEN_TYPE_RESET.to_string(),
            iat: 1_700_000_000,
            exp: 1_700_001_800,
            jti: Uuid::new_v4().to_string(),
            iss: "suoke-auth-service".to_string(),
            aud: "https://suoke.life".to_string(),
        };
        assert_eq!(claims.exp - claims.iat, 1800);
    }
}
