// Session manager: owns the session state machine, the write-through cache
// at `session:{id}`, and suspicious-login classification on creation.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::app_config::SessionSettings;
use crate::db::{DieselPool, RedisPool};
use crate::models::session::{NewSession, Session, SessionError, SessionStatus, SessionUpdate};
use crate::services::risk;
use crate::services::security_log::{SecurityEventType, SecurityLogService};
use crate::services::transports::{GeoLookup, NotificationDispatch, SuspiciousLoginNotice};
use crate::utils::device_fingerprint::DeviceInfo;

#[derive(Error, Debug)]
pub enum SessionManagerError {
    #[error("Session not found")]
    NotFound,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<SessionError> for SessionManagerError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => SessionManagerError::NotFound,
            SessionError::InvalidTransition { from, to } => {
                SessionManagerError::InvalidTransition { from, to }
            }
            SessionError::Database(e) => SessionManagerError::Storage(e.to_string()),
            SessionError::Pool(e) => SessionManagerError::Pool(e),
        }
    }
}

/// Inputs for session creation
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub token_id: Option<String>,
    pub device_id: Option<Uuid>,
    pub device_info: Option<DeviceInfo>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: SessionStatus,
    pub expires_in: u64,
}

pub struct SessionManager {
    pool: DieselPool,
    redis_pool: RedisPool,
    settings: SessionSettings,
    geo: Arc<dyn GeoLookup>,
    notifier: Arc<dyn NotificationDispatch>,
    security_log: SecurityLogService,
}

impl SessionManager {
    pub fn new(
        pool: DieselPool,
        redis_pool: RedisPool,
        settings: SessionSettings,
        geo: Arc<dyn GeoLookup>,
        notifier: Arc<dyn NotificationDispatch>,
        security_log: SecurityLogService,
    ) -> Self {
        Self {
            pool,
            redis_pool,
            settings,
            geo,
            notifier,
            security_log,
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
        SessionManagerError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| SessionManagerError::Pool(e.to_string()))
    }

    fn cache_key(session_id: Uuid) -> String {
        format!("session:{}", session_id)
    }

    /// Write-through cache population. Cache failures never fail the write
    /// path; the row is authoritative and validity is rechecked on reads.
    async fn cache_put(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(json) => {
                if let Err(e) = self
                    .redis_pool
                    .set_with_expiry(&Self::cache_key(session.id), json, self.settings.cache_ttl)
                    .await
                {
                    warn!("Failed to cache session {}: {}", session.id, e);
                }
            }
            Err(e) => warn!("Failed to serialize session {}: {}", session.id, e),
        }
    }

    async fn cache_evict(&self, session_id: Uuid) {
        if let Err(e) = self.redis_pool.del(&Self::cache_key(session_id)).await {
            warn!("Failed to evict session {} from cache: {}", session_id, e);
        }
    }

    /// Create a session. Derives location best-effort, classifies active
    /// sessions through the suspicion heuristic, and makes the session
    /// current when the user has no current session yet.
    pub async fn create(&self, input: CreateSession) -> Result<Session, SessionManagerError> {
        let location = match &input.ip {
            Some(ip) => self
                .geo
                .lookup(ip)
                .await
                .map(|loc| loc.to_storage_string()),
            None => None,
        };

        let mut status = input.status;
        let mut conn = self.conn().await?;

        // The suspicion heuristic only applies to sessions born active
        if status == SessionStatus::Active {
            let prior = Session::recent_active(&mut conn, input.user_id, 5).await?;
            let current_country = location
                .as_deref()
                .and_then(|loc| loc.split(',').next())
                .filter(|c| !c.is_empty());
            let suspicious = risk::evaluate_suspicion(
                &prior,
                input.ip.as_deref(),
                current_country,
                input.user_agent.as_deref(),
                Utc::now(),
            );
            if suspicious {
                status = SessionStatus::Suspicious;
            }
        }

        // Only bearer-valid sessions compete for the current flag
        let is_current = if status.is_bearer_valid() {
            !Session::has_current(&mut conn, input.user_id).await?
        } else {
            false
        };

        let fingerprint = input
            .device_info
            .as_ref()
            .map(|info| crate::utils::device_fingerprint::fingerprint(
                &crate::utils::device_fingerprint::normalize_device(info),
            ));

        let new_session = NewSession {
            user_id: input.user_id,
            token_id: input.token_id.clone(),
            device_id: input.device_id,
            fingerprint,
            ip: input.ip.clone(),
            user_agent: input.user_agent.clone(),
            location,
            status: status.as_str().to_string(),
            is_current,
            expires_at: Utc::now() + Duration::seconds(input.expires_in as i64),
        };

        let session = Session::insert(&mut conn, new_session).await?;
        drop(conn);

        self.cache_put(&session).await;

        if status == SessionStatus::Suspicious {
            self.security_log
                .log(
                    SecurityEventType::SuspiciousActivity,
                    Some(session.user_id),
                    serde_json::json!({
                        "session_id": session.id,
                        "ip": session.ip,
                        "location": session.location,
                    }),
                )
                .await;

            // Fire-and-forget notification; failure is logged, never bubbled
            let notifier = self.notifier.clone();
            let notice = SuspiciousLoginNotice {
                session_id: session.id,
                ip: session.ip.clone(),
                location: session.location.clone(),
                device_name: session.user_agent.clone(),
                time: session.created_at,
            };
            let user_id = session.user_id;
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_suspicious_login(user_id, notice).await {
                    warn!("Suspicious-login notification failed for {}: {}", user_id, e);
                }
            });
        }

        Ok(session)
    }

    /// Cache-first read with RS fallback and repopulation.
    pub async fn get(&self, session_id: Uuid) -> Result<Session, SessionManagerError> {
        match self.redis_pool.get_string(&Self::cache_key(session_id)).await {
            Ok(Some(json)) => match serde_json::from_str::<Session>(&json) {
                Ok(session) => return Ok(session),
                Err(e) => warn!("Corrupt session cache entry {}: {}", session_id, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Session cache read failed for {}: {}", session_id, e),
        }

        let mut conn = self.conn().await?;
        let session = Session::find_by_id(&mut conn, session_id).await?;
        drop(conn);

        self.cache_put(&session).await;
        Ok(session)
    }

    pub async fn get_by_token_id(&self, jti: &str) -> Result<Session, SessionManagerError> {
        let mut conn = self.conn().await?;
        Ok(Session::find_by_token_id(&mut conn, jti).await?)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        active_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Session>, SessionManagerError> {
        let mut conn = self.conn().await?;
        Ok(Session::list_for_user(&mut conn, user_id, active_only, limit, offset).await?)
    }

    /// Touch last_active_at in both stores.
    pub async fn update_activity(&self, session_id: Uuid) -> Result<(), SessionManagerError> {
        let mut conn = self.conn().await?;
        let session = Session::touch_activity(&mut conn, session_id).await?;
        drop(conn);

        self.cache_put(&session).await;
        Ok(())
    }

    /// Transition a session's status under the state-machine guard and
    /// evict the cache entry.
    pub async fn update_status(
        &self,
        session_id: Uuid,
        new_status: SessionStatus,
        expires_in: Option<u64>,
    ) -> Result<Session, SessionManagerError> {
        let mut conn = self.conn().await?;
        let session = Session::find_by_id(&mut conn, session_id).await?;

        let current = session.status_enum();
        if !current.can_transition(new_status) {
            return Err(SessionManagerError::InvalidTransition {
                from: current.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let update = SessionUpdate {
            status: Some(new_status.as_str().to_string()),
            expires_at: expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
            last_active_at: Some(Utc::now()),
            ..Default::default()
        };

        let updated = Session::apply_update(&mut conn, session_id, update).await?;
        drop(conn);

        self.cache_evict(session_id).await;
        Ok(updated)
    }

    /// Bind the issued token and device to a session (post-issue step of
    /// the login flows).
    pub async fn bind_token(
        &self,
        session_id: Uuid,
        token_id: &str,
        device_id: Option<Uuid>,
    ) -> Result<Session, SessionManagerError> {
        let mut conn = self.conn().await?;
        let update = SessionUpdate {
            token_id: Some(Some(token_id.to_string())),
            device_id: device_id.map(Some),
            ..Default::default()
        };
        let updated = Session::apply_update(&mut conn, session_id, update).await?;
        drop(conn);

        self.cache_put(&updated).await;
        Ok(updated)
    }

    /// Promote a session to current only when the user has no current
    /// session. Used when a temp session graduates to active.
    pub async fn ensure_current(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), SessionManagerError> {
        let mut conn = self.conn().await?;
        if Session::has_current(&mut conn, user_id).await? {
            return Ok(());
        }
        Session::set_current(&mut conn, user_id, session_id).await?;
        drop(conn);

        self.cache_evict(session_id).await;
        Ok(())
    }

    /// Transactionally make one session current.
    pub async fn set_current(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), SessionManagerError> {
        let mut conn = self.conn().await?;
        Session::set_current(&mut conn, user_id, session_id).await?;
        drop(conn);

        // Evict rather than repopulate: other sessions changed too
        self.cache_evict(session_id).await;
        Ok(())
    }

    /// Revoke a single session.
    pub async fn revoke(
        &self,
        session_id: Uuid,
        reason: &str,
    ) -> Result<Session, SessionManagerError> {
        let mut conn = self.conn().await?;
        let session = Session::find_by_id(&mut conn, session_id).await?;

        if session.status_enum().is_terminal() {
            // Idempotent: already terminal
            return Ok(session);
        }

        let update = SessionUpdate {
            status: Some(SessionStatus::Revoked.as_str().to_string()),
            ..Default::default()
        };
        let updated = Session::apply_update(&mut conn, session_id, update).await?;
        drop(conn);

        self.cache_evict(session_id).await;

        self.security_log
            .log(
                SecurityEventType::Logout,
                Some(updated.user_id),
                serde_json::json!({ "session_id": session_id, "reason": reason }),
            )
            .await;

        Ok(updated)
    }

    /// Revoke every live session of a user, optionally sparing one.
    /// Returns the number revoked.
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        except: Option<Uuid>,
        reason: &str,
    ) -> Result<usize, SessionManagerError> {
        let mut conn = self.conn().await?;
        let revoked = Session::revoke_all_for_user(&mut conn, user_id, except).await?;
        drop(conn);

        for session_id in &revoked {
            self.cache_evict(*session_id).await;
        }

        self.security_log
            .log(
                SecurityEventType::Logout,
                Some(user_id),
                serde_json::json!({ "revoked": revoked.len(), "reason": reason }),
            )
            .await;

        Ok(revoked.len())
    }

    /// Bulk-expire sessions past their deadline. Intended for the periodic
    /// scheduler.
    pub async fn cleanup_expired(&self) -> Result<usize, SessionManagerError> {
        let mut conn = self.conn().await?;
        let expired = Session::mark_expired(&mut conn).await?;
        drop(conn);

        for session_id in &expired {
            self.cache_evict(*session_id).await;
        }

        if !expired.is_empty() {
            tracing::info!("Expired {} sessions", expired.len());
        }
        Ok(expired.len())
    }

    /// A session is valid iff it is bearer-valid, owned by the user, and
    /// not past its expiry. A session expiring exactly now is expired.
    pub async fn is_valid(&self, session_id: Uuid, user_id: Uuid) -> bool {
        match self.get(session_id).await {
            Ok(session) => {
                session.user_id == user_id
                    && session.status_enum().is_bearer_valid()
                    && session.expires_at > Utc::now()
            }
            Err(_) => false,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}
