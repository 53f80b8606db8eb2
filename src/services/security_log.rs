// Append-only security event stream backed by the key-value cache.
// Events are TTL-bounded by the retention policy and indexed per user in a
// sorted set trimmed to the most recent entries. Writes are best-effort:
// a failed log write never fails the parent operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_config::RetentionSettings;
use crate::db::RedisPool;

/// Enumerated security event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailure,
    Logout,
    TokenIssued,
    TokenRefreshed,
    TokenRevoked,
    PasswordResetRequested,
    PasswordResetCompleted,
    TwoFactorEnabled,
    TwoFactorVerified,
    TwoFactorFailed,
    TwoFactorDisabled,
    RecoveryCodeUsed,
    DeviceTrusted,
    DeviceRemoved,
    SuspiciousActivity,
    UserRegistered,
    PermissionsChanged,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "LOGIN_SUCCESS",
            SecurityEventType::LoginFailure => "LOGIN_FAILURE",
            SecurityEventType::Logout => "LOGOUT",
            SecurityEventType::TokenIssued => "TOKEN_ISSUED",
            SecurityEventType::TokenRefreshed => "TOKEN_REFRESHED",
            SecurityEventType::TokenRevoked => "TOKEN_REVOKED",
            SecurityEventType::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            SecurityEventType::PasswordResetCompleted => "PASSWORD_RESET_COMPLETED",
            SecurityEventType::TwoFactorEnabled => "TWO_FACTOR_ENABLED",
            SecurityEventType::TwoFactorVerified => "TWO_FACTOR_VERIFIED",
            SecurityEventType::TwoFactorFailed => "TWO_FACTOR_FAILED",
            SecurityEventType::TwoFactorDisabled => "TWO_FACTOR_DISABLED",
            SecurityEventType::RecoveryCodeUsed => "RECOVERY_CODE_USED",
            SecurityEventType::DeviceTrusted => "DEVICE_TRUSTED",
            SecurityEventType::DeviceRemoved => "DEVICE_REMOVED",
            SecurityEventType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            SecurityEventType::UserRegistered => "USER_REGISTERED",
            SecurityEventType::PermissionsChanged => "PERMISSIONS_CHANGED",
        }
    }
}

/// A recorded security event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

/// Keys whose values must never reach the event stream.
const SECRET_KEY_MARKERS: [&str; 6] = [
    "password", "token", "secret", "code", "authorization", "hash",
];

/// Recursively strip secret-bearing fields from an event payload.
pub fn sanitize_payload(payload: serde_json::Value) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(map) => {
            let cleaned = map
                .into_iter()
                .filter(|(key, _)| {
                    let key = key.to_lowercase();
                    !SECRET_KEY_MARKERS.iter().any(|marker| key.contains(marker))
                })
                .map(|(key, value)| (key, sanitize_payload(value)))
                .collect();
            serde_json::Value::Object(cleaned)
        }
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(sanitize_payload).collect())
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct SecurityLogService {
    redis_pool: RedisPool,
    retention: RetentionSettings,
}

impl SecurityLogService {
    pub fn new(redis_pool: RedisPool, retention: RetentionSettings) -> Self {
        Self {
            redis_pool,
            retention,
        }
    }

    fn retention_seconds(&self, event_type: SecurityEventType) -> u64 {
        let base = self.retention.security_log_retention_days as u64 * 86400;
        if self
            .retention
            .high_priority_events
            .iter()
            .any(|e| e == event_type.as_str())
        {
            base * 3
        } else {
            base
        }
    }

    /// Record an event. Best-effort: failures are logged and swallowed.
    pub async fn log(
        &self,
        event_type: SecurityEventType,
        user_id: Option<Uuid>,
        payload: serde_json::Value,
    ) {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: event_type.as_str().to_string(),
            timestamp: Utc::now(),
            user_id,
            payload: sanitize_payload(payload),
        };

        let serialized = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize security event: {}", e);
                return;
            }
        };

        // Mirror into the tracing stream for operators
        info!(target: "audit", "{}", serialized);

        let event_key = format!("security_log:{}:{}", event.event_type, event.id);
        if let Err(e) = self
            .redis_pool
            .set_with_expiry(&event_key, serialized, self.retention_seconds(event_type))
            .await
        {
            warn!("Failed to write security event {}: {}", event.id, e);
            return;
        }

        if let Some(uid) = user_id {
            let index_key = format!("security_log:user:{}:events", uid);
            let member = format!("{}:{}", event.event_type, event.id);
            let score = event.timestamp.timestamp_millis() as f64;
            if let Err(e) = self
                .redis_pool
                .zadd_trimmed(
                    &index_key,
                    &member,
                    score,
                    self.retention.user_event_index_limit,
                )
                .await
            {
                warn!("Failed to index security event for user {}: {}", uid, e);
            }
        }
    }

    /// Read back a user's most recent events, newest first. Events whose
    /// TTL already expired are silently skipped.
    pub async fn recent_events(&self, user_id: Uuid, limit: usize) -> Vec<SecurityEvent> {
        let index_key = format!("security_log:user:{}:events", user_id);
        let members = match self
            .redis_pool
            .zrevrange(&index_key, 0, limit.saturating_sub(1) as isize)
            .await
        {
            Ok(members) => members,
            Err(e) => {
                warn!("Failed to read event index for user {}: {}", user_id, e);
                return Vec::new();
            }
        };

        let mut events = Vec::with_capacity(members.len());
        for member in members {
            let event_key = format!("security_log:{}", member);
            match self.redis_pool.get_string(&event_key).await {
                Ok(Some(json)) => match serde_json::from_str::<SecurityEvent>(&json) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!("Corrupt security event {}: {}", member, e),
                },
                Ok(None) => {} // expired out of retention
                Err(e) => warn!("Failed to read security event {}: {}", member, e),
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_strings() {
        assert_eq!(SecurityEventType::LoginSuccess.as_str(), "LOGIN_SUCCESS");
        assert_eq!(
            SecurityEventType::SuspiciousActivity.as_str(),
            "SUSPICIOUS_ACTIVITY"
        );
        assert_eq!(
            SecurityEventType::TwoFactorVerified.as_str(),
            "TWO_FACTOR_VERIFIED"
        );
    }

    #[test]
    fn test_sanitize_strips_secret_fields() {
        let payload = json!({
            "ip": "203.0.113.4",
            "password": "hunter2",
            "access_token": "eyJ...",
            "two_factor_secret": "JBSWY3DP",
            "reset_code": "123456",
            "nested": {
                "Authorization": "Bearer abc",
                "device": "iPhone"
            }
        });

        let cleaned = sanitize_payload(payload);
        let obj = cleaned.as_object().unwrap();
        assert!(obj.contains_key("ip"));
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("access_token"));
        assert!(!obj.contains_key("two_factor_secret"));
        assert!(!obj.contains_key("reset_code"));

        let nested = obj.get("nested").unwrap().as_object().unwrap();
        assert!(!nested.contains_key("Authorization"));
        assert_eq!(
            nested.get("device").and_then(|v| v.as_str()),
            Some("iPhone")
        );
    }

    #[test]
    fn test_sanitize_preserves_arrays_and_scalars() {
        let payload = json!({"roles": ["admin", "user"], "count": 3});
        let cleaned = sanitize_payload(payload.clone());
        assert_eq!(cleaned, payload);
    }
}
