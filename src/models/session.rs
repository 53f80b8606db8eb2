// Session database model and state machine.
// Transitions only move toward the terminal states {expired, revoked}.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::user_sessions;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Pending2fa,
    PendingDeviceVerification,
    Expired,
    Revoked,
    Suspicious,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Pending2fa => "pending_2fa",
            SessionStatus::PendingDeviceVerification => "pending_device_verification",
            SessionStatus::Expired => "expired",
            SessionStatus::Revoked => "revoked",
            SessionStatus::Suspicious => "suspicious",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Revoked)
    }

    /// Whether a session in this state is honored as a bearer context.
    /// `suspicious` sessions remain valid until explicitly revoked.
    pub fn is_bearer_valid(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Suspicious)
    }

    /// State machine guard. Terminal states accept nothing; every state may
    /// move to a terminal state; pending states may advance toward active;
    /// active may only be flagged suspicious.
    pub fn can_transition(&self, to: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to.is_terminal() {
            return true;
        }
        match (self, to) {
            (SessionStatus::PendingDeviceVerification, SessionStatus::Pending2fa) => true,
            (SessionStatus::PendingDeviceVerification, SessionStatus::Active) => true,
            (SessionStatus::Pending2fa, SessionStatus::Active) => true,
            (SessionStatus::Pending2fa, SessionStatus::PendingDeviceVerification) => true,
            // suspicious is reachable from active only: a pending session
            // must never become bearer-valid without completing its step
            (SessionStatus::Active, SessionStatus::Suspicious) => true,
            _ => false,
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "pending_2fa" => Ok(SessionStatus::Pending2fa),
            "pending_device_verification" => Ok(SessionStatus::PendingDeviceVerification),
            "expired" => Ok(SessionStatus::Expired),
            "revoked" => Ok(SessionStatus::Revoked),
            "suspicious" => Ok(SessionStatus::Suspicious),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

/// Session database model. Also the cache snapshot shape: the full row is
/// serialized into `session:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = user_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_id: Option<String>,
    pub device_id: Option<Uuid>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// New session for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = user_sessions)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_id: Option<String>,
    pub device_id: Option<Uuid>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub is_current: bool,
    pub expires_at: DateTime<Utc>,
}

/// Session update struct
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = user_sessions)]
pub struct SessionUpdate {
    pub token_id: Option<Option<String>>,
    pub device_id: Option<Option<Uuid>>,
    pub status: Option<String>,
    pub is_current: Option<bool>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Errors for session operations
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Session not found")]
    NotFound,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl Session {
    pub fn status_enum(&self) -> SessionStatus {
        SessionStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid status '{}' for session {}, treating as revoked: {}",
                self.status,
                self.id,
                e
            );
            SessionStatus::Revoked
        })
    }

    /// Country component of the derived location, when present.
    /// Locations are stored as "CC" or "CC,region,city".
    pub fn country(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(|loc| loc.split(',').next().unwrap_or(loc).trim())
            .filter(|c| !c.is_empty())
    }

    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new_session: NewSession,
    ) -> Result<Self, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        diesel::insert_into(user_sessions)
            .values(&new_session)
            .get_result::<Session>(conn)
            .await
            .map_err(SessionError::Database)
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        session_id: Uuid,
    ) -> Result<Self, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        user_sessions
            .filter(id.eq(session_id))
            .first::<Session>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => SessionError::NotFound,
                _ => SessionError::Database(e),
            })
    }

    pub async fn find_by_token_id(
        conn: &mut AsyncPgConnection,
        jti: &str,
    ) -> Result<Self, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        user_sessions
            .filter(token_id.eq(jti))
            .order(created_at.desc())
            .first::<Session>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => SessionError::NotFound,
                _ => SessionError::Database(e),
            })
    }

    pub async fn list_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        active_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        let mut query = user_sessions
            .filter(user_id.eq(owner))
            .order(last_active_at.desc())
            .limit(limit)
            .offset(offset)
            .into_boxed();

        if active_only {
            query = query
                .filter(status.eq_any(vec!["active", "suspicious"]))
                .filter(expires_at.gt(Utc::now()));
        }

        query
            .load::<Session>(conn)
            .await
            .map_err(SessionError::Database)
    }

    /// Most recent bearer-valid sessions, newest first. Used by the
    /// suspicious-login heuristic.
    pub async fn recent_active(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        user_sessions
            .filter(user_id.eq(owner))
            .filter(status.eq_any(vec!["active", "suspicious"]))
            .order(created_at.desc())
            .limit(limit)
            .load::<Session>(conn)
            .await
            .map_err(SessionError::Database)
    }

    pub async fn has_current(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
    ) -> Result<bool, SessionError> {
        use crate::schema::user_sessions::dsl::*;
        use diesel::dsl::count_star;

        let count: i64 = user_sessions
            .filter(user_id.eq(owner))
            .filter(is_current.eq(true))
            .select(count_star())
            .get_result(conn)
            .await
            .map_err(SessionError::Database)?;
        Ok(count > 0)
    }

    pub async fn apply_update(
        conn: &mut AsyncPgConnection,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<Self, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        diesel::update(user_sessions.filter(id.eq(session_id)))
            .set(&update)
            .get_result::<Session>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => SessionError::NotFound,
                _ => SessionError::Database(e),
            })
    }

    pub async fn touch_activity(
        conn: &mut AsyncPgConnection,
        session_id: Uuid,
    ) -> Result<Self, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        diesel::update(user_sessions.filter(id.eq(session_id)))
            .set(last_active_at.eq(Utc::now()))
            .get_result::<Session>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => SessionError::NotFound,
                _ => SessionError::Database(e),
            })
    }

    /// Transactionally make one session current: clear the flag on every
    /// other session of the user, then set it on the target.
    pub async fn set_current(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        session_id: Uuid,
    ) -> Result<(), SessionError> {
        conn.transaction::<_, SessionError, _>(|tx| {
            Box::pin(async move {
                use crate::schema::user_sessions::dsl::*;

                diesel::update(
                    user_sessions
                        .filter(user_id.eq(owner))
                        .filter(id.ne(session_id)),
                )
                .set(is_current.eq(false))
                .execute(tx)
                .await?;

                let updated = diesel::update(
                    user_sessions
                        .filter(user_id.eq(owner))
                        .filter(id.eq(session_id)),
                )
                .set(is_current.eq(true))
                .execute(tx)
                .await?;

                if updated == 0 {
                    return Err(SessionError::NotFound);
                }
                Ok(())
            })
        })
        .await
    }

    /// Revoke every non-terminal session of a user, optionally sparing one.
    /// Returns the ids of the sessions that were revoked.
    pub async fn revoke_all_for_user(
        conn: &mut AsyncPgConnection,
        owner: Uuid,
        except: Option<Uuid>,
    ) -> Result<Vec<Uuid>, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        match except {
            Some(spared) => diesel::update(
                user_sessions
                    .filter(user_id.eq(owner))
                    .filter(status.ne_all(vec!["expired", "revoked"]))
                    .filter(id.ne(spared)),
            )
            .set(status.eq("revoked"))
            .returning(id)
            .get_results::<Uuid>(conn)
            .await
            .map_err(SessionError::Database),
            None => diesel::update(
                user_sessions
                    .filter(user_id.eq(owner))
                    .filter(status.ne_all(vec!["expired", "revoked"])),
            )
            .set(status.eq("revoked"))
            .returning(id)
            .get_results::<Uuid>(conn)
            .await
            .map_err(SessionError::Database),
        }
    }

    /// Bulk-mark sessions past their expiry. Returns affected ids.
    pub async fn mark_expired(conn: &mut AsyncPgConnection) -> Result<Vec<Uuid>, SessionError> {
        use crate::schema::user_sessions::dsl::*;

        diesel::update(
            user_sessions
                .filter(expires_at.le(Utc::now()))
                .filter(status.ne_all(vec!["expired", "revoked"])),
        )
        .set(status.eq("expired"))
        .returning(id)
        .get_results::<Uuid>(conn)
        .await
        .map_err(SessionError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Pending2fa,
            SessionStatus::PendingDeviceVerification,
            SessionStatus::Expired,
            SessionStatus::Revoked,
            SessionStatus::Suspicious,
        ] {
            assert_eq!(SessionStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(SessionStatus::from_str("paused").is_err());
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for terminal in [SessionStatus::Expired, SessionStatus::Revoked] {
            for to in [
                SessionStatus::Active,
                SessionStatus::Pending2fa,
                SessionStatus::PendingDeviceVerification,
                SessionStatus::Expired,
                SessionStatus::Revoked,
                SessionStatus::Suspicious,
            ] {
                assert!(!terminal.can_transition(to), "{:?} -> {:?}", terminal, to);
            }
        }
    }

    #[test]
    fn test_every_live_state_can_terminate() {
        for from in [
            SessionStatus::Active,
            SessionStatus::Pending2fa,
            SessionStatus::PendingDeviceVerification,
            SessionStatus::Suspicious,
        ] {
            assert!(from.can_transition(SessionStatus::Expired));
            assert!(from.can_transition(SessionStatus::Revoked));
        }
    }

    #[test]
    fn test_pending_flows() {
        assert!(SessionStatus::PendingDeviceVerification.can_transition(SessionStatus::Pending2fa));
        assert!(SessionStatus::PendingDeviceVerification.can_transition(SessionStatus::Active));
        assert!(SessionStatus::Pending2fa.can_transition(SessionStatus::Active));
        assert!(
            SessionStatus::Pending2fa.can_transition(SessionStatus::PendingDeviceVerification),
            "2FA-verified logins may still need device verification"
        );
    }

    #[test]
    fn test_pending_sessions_cannot_turn_suspicious() {
        // suspicious is bearer-valid, so reaching it without completing
        // the pending step would bypass 2FA/device verification
        assert!(!SessionStatus::Pending2fa.can_transition(SessionStatus::Suspicious));
        assert!(
            !SessionStatus::PendingDeviceVerification.can_transition(SessionStatus::Suspicious)
        );
    }

    #[test]
    fn test_active_cannot_regress() {
        assert!(!SessionStatus::Active.can_transition(SessionStatus::Pending2fa));
        assert!(!SessionStatus::Active.can_transition(SessionStatus::PendingDeviceVerification));
        assert!(SessionStatus::Active.can_transition(SessionStatus::Suspicious));
        assert!(!SessionStatus::Suspicious.can_transition(SessionStatus::Active));
    }

    #[test]
    fn test_bearer_validity() {
        assert!(SessionStatus::Active.is_bearer_valid());
        assert!(SessionStatus::Suspicious.is_bearer_valid());
        assert!(!SessionStatus::Pending2fa.is_bearer_valid());
        assert!(!SessionStatus::PendingDeviceVerification.is_bearer_valid());
        assert!(!SessionStatus::Expired.is_bearer_valid());
        assert!(!SessionStatus::Revoked.is_bearer_valid());
    }

    #[test]
    fn test_country_extraction() {
        let mut session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_id: None,
            device_id: None,
            fingerprint: None,
            ip: None,
            user_agent: None,
            location: Some("CN,Beijing,Beijing".to_string()),
            status: "active".to_string(),
            is_current: false,
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            expires_at: Utc::now(),
        };
        assert_eq!(session.country(), Some("CN"));

        session.location = Some("US".to_string());
        assert_eq!(session.country(), Some("US"));

        session.location = None;
        assert_eq!(session.country(), None);
    }
}
