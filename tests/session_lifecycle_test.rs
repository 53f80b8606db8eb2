// Session state machine and claim-binding behavior that does not require
// live stores

use chrono::{Duration, Utc};
use uuid::Uuid;

use suoke_auth_core::models::{Session, SessionStatus};

fn session_in(status: SessionStatus, expires_in_secs: i64) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        token_id: Some(Uuid::new_v4().to_string()),
        device_id: Some(Uuid::new_v4()),
        fingerprint: None,
        ip: Some("203.0.113.4".to_string()),
        user_agent: None,
        location: Some("CN,Beijing".to_string()),
        status: status.as_str().to_string(),
        is_current: false,
        created_at: now,
        last_active_at: now,
        expires_at: now + Duration::seconds(expires_in_secs),
    }
}

#[test]
fn test_terminal_states_are_never_bearer_valid() {
    for status in [SessionStatus::Expired, SessionStatus::Revoked] {
        let session = session_in(status, 3600);
        assert!(!session.status_enum().is_bearer_valid());
        assert!(session.status_enum().is_terminal());
    }
}

#[test]
fn test_suspicious_sessions_remain_bearer_valid() {
    let session = session_in(SessionStatus::Suspicious, 3600);
    assert!(session.status_enum().is_bearer_valid());
    assert!(!session.status_enum().is_terminal());
}

#[test]
fn test_pending_states_are_not_bearer_valid() {
    for status in [
        SessionStatus::Pending2fa,
        SessionStatus::PendingDeviceVerification,
    ] {
        let session = session_in(status, 3600);
        assert!(!session.status_enum().is_bearer_valid());
    }
}

#[test]
fn test_transitions_are_monotonic_toward_terminal() {
    // the full login progression is legal
    assert!(SessionStatus::PendingDeviceVerification.can_transition(SessionStatus::Pending2fa));
    assert!(SessionStatus::Pending2fa.can_transition(SessionStatus::Active));
    assert!(SessionStatus::Active.can_transition(SessionStatus::Suspicious));
    assert!(SessionStatus::Suspicious.can_transition(SessionStatus::Revoked));

    // and no edge points backwards
    assert!(!SessionStatus::Active.can_transition(SessionStatus::Pending2fa));
    assert!(!SessionStatus::Suspicious.can_transition(SessionStatus::Active));
    assert!(!SessionStatus::Revoked.can_transition(SessionStatus::Active));
    assert!(!SessionStatus::Expired.can_transition(SessionStatus::Revoked));

    // suspicious only ever flows out of active; a pending session cannot
    // shortcut into a bearer-valid state
    assert!(!SessionStatus::Pending2fa.can_transition(SessionStatus::Suspicious));
    assert!(!SessionStatus::PendingDeviceVerification.can_transition(SessionStatus::Suspicious));
}

#[test]
fn test_status_strings_are_stable() {
    // cache snapshots and rows persist these strings; they are wire format
    assert_eq!(SessionStatus::Active.as_str(), "active");
    assert_eq!(SessionStatus::Pending2fa.as_str(), "pending_2fa");
    assert_eq!(
        SessionStatus::PendingDeviceVerification.as_str(),
        "pending_device_verification"
    );
    assert_eq!(SessionStatus::Expired.as_str(), "expired");
    assert_eq!(SessionStatus::Revoked.as_str(), "revoked");
    assert_eq!(SessionStatus::Suspicious.as_str(), "suspicious");
}

#[test]
fn test_session_snapshot_round_trips_through_cache_form() {
    let session = session_in(SessionStatus::Active, 3600);
    let json = serde_json::to_string(&session).unwrap();
    let decoded: Session = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded.id, session.id);
    assert_eq!(decoded.user_id, session.user_id);
    assert_eq!(decoded.status, session.status);
    assert_eq!(decoded.token_id, session.token_id);
    assert_eq!(decoded.country(), Some("CN"));
}
