// Contracts for external collaborators: email, SMS, geo lookup and
// suspicious-login notification. The core depends only on these traits;
// delivery adapters live outside. Logging implementations are provided for
// development and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// Outbound email delivery
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_welcome(&self, to: &str, username: &str) -> Result<(), TransportError>;

    async fn send_password_reset(
        &self,
        to: &str,
        reset_token: &str,
        display_name: &str,
    ) -> Result<(), TransportError>;
}

/// Outbound SMS delivery
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_verification_code(&self, phone: &str, code: &str) -> Result<(), TransportError>;
}

/// Best-effort IP geolocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub region: Option<String>,
    pub city: Option<String>,
}

impl GeoLocation {
    /// Storage form used in the session row: "CC" or "CC,region,city".
    pub fn to_storage_string(&self) -> String {
        let mut parts = vec![self.country.clone()];
        if let Some(region) = &self.region {
            parts.push(region.clone());
            if let Some(city) = &self.city {
                parts.push(city.clone());
            }
        }
        parts.join(",")
    }
}

#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Option<GeoLocation>;
}

/// Suspicious-login notification details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousLoginNotice {
    pub session_id: Uuid,
    pub ip: Option<String>,
    pub location: Option<String>,
    pub device_name: Option<String>,
    pub time: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn notify_suspicious_login(
        &self,
        user_id: Uuid,
        notice: SuspiciousLoginNotice,
    ) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Development implementations
// ---------------------------------------------------------------------------

/// Logs outbound email instead of sending it.
pub struct LoggingEmailTransport;

#[async_trait]
impl EmailTransport for LoggingEmailTransport {
    async fn send_welcome(&self, to: &str, username: &str) -> Result<(), TransportError> {
        tracing::info!(to = to, username = username, "Welcome email (logged, not sent)");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        to: &str,
        _reset_token: &str,
        display_name: &str,
    ) -> Result<(), TransportError> {
        tracing::info!(
            to = to,
            display_name = display_name,
            "Password reset email (logged, not sent)"
        );
        Ok(())
    }
}

/// Logs outbound SMS instead of sending it.
pub struct LoggingSmsTransport;

#[async_trait]
impl SmsTransport for LoggingSmsTransport {
    async fn send_verification_code(&self, phone: &str, _code: &str) -> Result<(), TransportError> {
        tracing::info!(phone = phone, "Verification SMS (logged, not sent)");
        Ok(())
    }
}

/// Geo lookup that always misses. Location stays null, which every consumer
/// tolerates.
pub struct NoopGeoLookup;

#[async_trait]
impl GeoLookup for NoopGeoLookup {
    async fn lookup(&self, _ip: &str) -> Option<GeoLocation> {
        None
    }
}

/// Logs suspicious-login notifications.
pub struct LoggingNotificationDispatch;

#[async_trait]
impl NotificationDispatch for LoggingNotificationDispatch {
    async fn notify_suspicious_login(
        &self,
        user_id: Uuid,
        notice: SuspiciousLoginNotice,
    ) -> Result<(), TransportError> {
        tracing::warn!(
            user_id = %user_id,
            session_id = %notice.session_id,
            ip = notice.ip.as_deref().unwrap_or("unknown"),
            "Suspicious login notification (logged, not dispatched)"
        );
        Ok(())
    }
}
