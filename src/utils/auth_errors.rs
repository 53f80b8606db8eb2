// Error taxonomy for the auth core. Kinds map onto abstract HTTP-style
// status codes; the transport adapter translates them at the edge.
// Pre-authentication failures surface one uniform message so callers cannot
// enumerate accounts.

use thiserror::Error;

/// Internal cause of an `Unauthorized` outcome. Never shown to callers;
/// logged and recorded in the security stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    UserNotFound,
    InvalidPassword,
    InvalidToken,
    TokenExpired,
    TokenRevoked,
    WrongTokenType,
    InvalidTwoFactorCode,
    InvalidVerificationCode,
    SessionInvalid,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::UserNotFound => "user_not_found",
            FailureReason::InvalidPassword => "invalid_password",
            FailureReason::InvalidToken => "invalid_token",
            FailureReason::TokenExpired => "token_expired",
            FailureReason::TokenRevoked => "token_revoked",
            FailureReason::WrongTokenType => "wrong_token_type",
            FailureReason::InvalidTwoFactorCode => "invalid_2fa_code",
            FailureReason::InvalidVerificationCode => "invalid_verification_code",
            FailureReason::SessionInvalid => "session_invalid",
        }
    }
}

/// Errors surfaced by the auth core.
#[derive(Error, Debug)]
pub enum AuthError {
    // The Display string is identical for every reason: wrong password and
    // unknown user must be indistinguishable to the caller.
    #[error("Invalid credentials")]
    Unauthorized { reason: FailureReason },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Internal error")]
    Internal(String),
}

impl AuthError {
    pub fn unauthorized(reason: FailureReason) -> Self {
        AuthError::Unauthorized { reason }
    }

    /// Abstract HTTP-style status code for the transport edge.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Unauthorized { .. } => 401,
            AuthError::Forbidden(_) => 403,
            AuthError::BadRequest(_) => 400,
            AuthError::NotFound(_) => 404,
            AuthError::Conflict(_) => 409,
            AuthError::RateLimited { .. } => 429,
            AuthError::Internal(_) => 500,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized { .. } => "UNAUTHORIZED",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::BadRequest(_) => "BAD_REQUEST",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Log an authentication failure with its internal reason.
pub fn log_auth_failure(identifier: &str, ip: &str, error: &AuthError, user_agent: Option<&str>) {
    let reason = match error {
        AuthError::Unauthorized { reason } => reason.as_str(),
        _ => error.error_code(),
    };
    tracing::warn!(
        identifier = identifier,
        ip = ip,
        user_agent = user_agent.unwrap_or("unknown"),
        reason = reason,
        "Authentication failure"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_unauthorized_message() {
        let not_found = AuthError::unauthorized(FailureReason::UserNotFound);
        let bad_password = AuthError::unauthorized(FailureReason::InvalidPassword);
        assert_eq!(not_found.to_string(), bad_password.to_string());
        assert_eq!(not_found.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::unauthorized(FailureReason::TokenExpired).status_code(),
            401
        );
        assert_eq!(AuthError::Forbidden("disabled".into()).status_code(), 403);
        assert_eq!(AuthError::BadRequest("bad".into()).status_code(), 400);
        assert_eq!(AuthError::NotFound("device".into()).status_code(), 404);
        assert_eq!(AuthError::Conflict("taken".into()).status_code(), 409);
        assert_eq!(
            AuthError::RateLimited {
                retry_after_seconds: 60
            }
            .status_code(),
            429
        );
        assert_eq!(AuthError::Internal("io".into()).status_code(), 500);
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        assert_eq!(
            AuthError::RateLimited {
                retry_after_seconds: 30
            }
            .retry_after(),
            Some(30)
        );
        assert_eq!(AuthError::Forbidden("x".into()).retry_after(), None);
    }
}
