// Risk engine: decides whether a login needs extra verification and
// classifies completed logins as suspicious. The heuristic itself is a pure
// function over the user's recent sessions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::session::Session;
use crate::models::user::User;
use crate::models::user_event::{NewUserEvent, UserEvent};
use crate::services::device::DeviceRegistry;
use crate::services::security_log::{SecurityEventType, SecurityLogService};
use crate::services::transports::GeoLookup;
use crate::utils::device_fingerprint::{device_type_from_user_agent, DeviceInfo};

/// Country changes within this window after the previous session flag the
/// login as suspicious.
const COUNTRY_CHANGE_WINDOW_HOURS: i64 = 24;

/// Device-type changes within this window flag the login as suspicious.
const DEVICE_CHANGE_WINDOW_HOURS: i64 = 12;

/// How many recent sessions feed the heuristic.
const RECENT_SESSION_SAMPLE: i64 = 5;

#[derive(Error, Debug)]
pub enum RiskEngineError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

/// How the pending verification code will reach the user.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VerificationInfo {
    pub method: String,
    pub masked_destination: String,
}

/// Outcome of the pre-login device check.
#[derive(Debug)]
pub struct LoginSecurityOutcome {
    pub verification_required: bool,
    pub verification_info: Option<VerificationInfo>,
    pub device_fingerprint: String,
    pub device: Option<crate::models::device::Device>,
}

/// Suspicious-login heuristic over the most recent bearer-valid sessions.
/// A first-ever session is never suspicious.
pub fn evaluate_suspicion(
    prior: &[Session],
    ip: Option<&str>,
    current_country: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    let last = match prior.first() {
        Some(last) => last,
        None => return false,
    };

    let known_ip = ip
        .map(|ip| prior.iter().any(|s| s.ip.as_deref() == Some(ip)))
        .unwrap_or(false);

    if !known_ip {
        if let (Some(current), Some(previous)) = (current_country, last.country()) {
            let hours_since = (now - last.created_at).num_hours();
            if current != previous && hours_since < COUNTRY_CHANGE_WINDOW_HOURS {
                return true;
            }
        }
    }

    if let Some(ua) = user_agent {
        let current_type = device_type_from_user_agent(ua);
        if current_type != "unknown" {
            let seen_type = prior.iter().any(|s| {
                s.user_agent
                    .as_deref()
                    .map(|prior_ua| device_type_from_user_agent(prior_ua) == current_type)
                    .unwrap_or(false)
            });
            let hours_since = (now - last.created_at).num_hours();
            if !seen_type && hours_since < DEVICE_CHANGE_WINDOW_HOURS {
                return true;
            }
        }
    }

    false
}

/// Mask a phone number, keeping the leading digits and the last two.
pub fn mask_phone(phone: &str) -> String {
    if phone.len() <= 5 {
        return "***".to_string();
    }
    let head = &phone[..3];
    let tail = &phone[phone.len() - 2..];
    format!("{}****{}", head, tail)
}

pub struct RiskEngine {
    pool: DieselPool,
    devices: Arc<DeviceRegistry>,
    geo: Arc<dyn GeoLookup>,
    security_log: SecurityLogService,
    require_device_verification: bool,
}

impl RiskEngine {
    pub fn new(
        pool: DieselPool,
        devices: Arc<DeviceRegistry>,
        geo: Arc<dyn GeoLookup>,
        security_log: SecurityLogService,
        require_device_verification: bool,
    ) -> Self {
        Self {
            pool,
            devices,
            geo,
            security_log,
            require_device_verification,
        }
    }

    async fn conn(
        &self,
    ) -> Result<
        bb8::PooledConnection<
            '_,
            diesel_async::pooled_connection::AsyncDieselConnectionManager<
                diesel_async::AsyncPgConnection,
            >,
        >,
        RiskEngineError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| RiskEngineError::Pool(e.to_string()))
    }

    /// Pre-login device check. A known or trusted device sails through;
    /// an unseen device requires verification when policy demands it.
    pub async fn process_login_security(
        &self,
        user: &User,
        device_info: &DeviceInfo,
    ) -> Result<LoginSecurityOutcome, RiskEngineError> {
        let fingerprint = self.devices.fingerprint_for(device_info);

        let device = self
            .devices
            .identify(user.id, device_info)
            .await
            .map_err(|e| RiskEngineError::Storage(e.to_string()))?;

        if device.is_some() || !self.require_device_verification {
            return Ok(LoginSecurityOutcome {
                verification_required: false,
                verification_info: None,
                device_fingerprint: fingerprint,
                device,
            });
        }

        // Unseen device: verification codes travel by SMS, so a verified
        // phone is the prerequisite. Without one the login proceeds.
        match user.phone.as_deref() {
            Some(phone) => Ok(LoginSecurityOutcome {
                verification_required: true,
                verification_info: Some(VerificationInfo {
                    method: "sms".to_string(),
                    masked_destination: mask_phone(phone),
                }),
                device_fingerprint: fingerprint,
                device: None,
            }),
            None => Ok(LoginSecurityOutcome {
                verification_required: false,
                verification_info: None,
                device_fingerprint: fingerprint,
                device: None,
            }),
        }
    }

    /// Classify a prospective login against the user's recent sessions.
    pub async fn detect_suspicious(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, RiskEngineError> {
        let mut conn = self.conn().await?;
        let prior = Session::recent_active(&mut conn, user_id, RECENT_SESSION_SAMPLE)
            .await
            .map_err(|e| RiskEngineError::Storage(e.to_string()))?;
        drop(conn);

        let current_country = match ip {
            Some(ip) => self.geo.lookup(ip).await.map(|loc| loc.country),
            None => None,
        };

        Ok(evaluate_suspicion(
            &prior,
            ip,
            current_country.as_deref(),
            user_agent,
            Utc::now(),
        ))
    }

    /// Record a successful login in the user event table and the security
    /// stream. Best-effort.
    pub async fn record_login_success(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        user_agent: Option<&str>,
        session_id: Option<Uuid>,
        device_id: Option<Uuid>,
    ) {
        if let Ok(mut conn) = self.conn().await {
            let event = NewUserEvent {
                user_id: Some(user_id),
                event_type: "login".to_string(),
                ip: ip.map(String::from),
                user_agent: user_agent.map(String::from),
                metadata: Some(serde_json::json!({
                    "session_id": session_id,
                    "device_id": device_id,
                })),
            };
            if let Err(e) = UserEvent::insert(&mut conn, event).await {
                warn!("Failed to record login event for {}: {}", user_id, e);
            }
        }

        self.security_log
            .log(
                SecurityEventType::LoginSuccess,
                Some(user_id),
                serde_json::json!({
                    "ip": ip,
                    "session_id": session_id,
                    "device_id": device_id,
                }),
            )
            .await;
    }

    /// Record a failed login. Failures on unknown identifiers are recorded
    /// with a null user id to support enumeration-attack analysis.
    pub async fn record_login_failure(
        &self,
        user_id: Option<Uuid>,
        reason: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) {
        if let Ok(mut conn) = self.conn().await {
            let event = NewUserEvent {
                user_id,
                event_type: "login_failed".to_string(),
                ip: ip.map(String::from),
                user_agent: user_agent.map(String::from),
                metadata: Some(serde_json::json!({ "reason": reason })),
            };
            if let Err(e) = UserEvent::insert(&mut conn, event).await {
                warn!("Failed to record login failure: {}", e);
            }
        }

        self.security_log
            .log(
                SecurityEventType::LoginFailure,
                user_id,
                serde_json::json!({ "reason": reason, "ip": ip }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    fn session(
        ip: &str,
        country: Option<&str>,
        user_agent: &str,
        hours_ago: i64,
    ) -> Session {
        let created = Utc::now() - Duration::hours(hours_ago);
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_id: None,
            device_id: None,
            fingerprint: None,
            ip: Some(ip.to_string()),
            user_agent: Some(user_agent.to_string()),
            location: country.map(String::from),
            status: "active".to_string(),
            is_current: false,
            created_at: created,
            last_active_at: created,
            expires_at: created + Duration::hours(24),
        }
    }

    #[test]
    fn test_first_session_never_suspicious() {
        assert!(!evaluate_suspicion(
            &[],
            Some("203.0.113.4"),
            Some("US"),
            Some(DESKTOP_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_rapid_country_change_is_suspicious() {
        let prior = vec![session("198.51.100.7", Some("CN"), DESKTOP_UA, 3)];
        assert!(evaluate_suspicion(
            &prior,
            Some("203.0.113.4"),
            Some("US"),
            Some(DESKTOP_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_slow_country_change_is_fine() {
        let prior = vec![session("198.51.100.7", Some("CN"), DESKTOP_UA, 48)];
        assert!(!evaluate_suspicion(
            &prior,
            Some("203.0.113.4"),
            Some("US"),
            Some(DESKTOP_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_known_ip_skips_country_check() {
        let prior = vec![session("203.0.113.4", Some("CN"), DESKTOP_UA, 3)];
        assert!(!evaluate_suspicion(
            &prior,
            Some("203.0.113.4"),
            Some("US"),
            Some(DESKTOP_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_rapid_device_type_change_is_suspicious() {
        let prior = vec![session("203.0.113.4", Some("US"), DESKTOP_UA, 2)];
        assert!(evaluate_suspicion(
            &prior,
            Some("203.0.113.4"),
            Some("US"),
            Some(MOBILE_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_device_type_change_after_window_is_fine() {
        let prior = vec![session("203.0.113.4", Some("US"), DESKTOP_UA, 20)];
        assert!(!evaluate_suspicion(
            &prior,
            Some("203.0.113.4"),
            Some("US"),
            Some(MOBILE_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_same_everything_is_fine() {
        let prior = vec![session("203.0.113.4", Some("US"), DESKTOP_UA, 1)];
        assert!(!evaluate_suspicion(
            &prior,
            Some("203.0.113.4"),
            Some("US"),
            Some(DESKTOP_UA),
            Utc::now()
        ));
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+8613912345678"), "+86****78");
        assert_eq!(mask_phone("139"), "***");
    }
}
