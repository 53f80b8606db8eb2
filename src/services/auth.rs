// Auth orchestrator: composes the token authority, session manager, device
// registry, risk engine and two-factor service into the full registration,
// login, refresh, logout and password-reset flows. No service below this
// layer depends back on it.

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::app_config::SessionSettings;
use crate::db::DieselPool;
use crate::models::session::{Session, SessionStatus};
use crate::models::user::{NewUser, User, UserError, UserPublic, UserStatus, UserUpdate};
use crate::services::device::DeviceRegistry;
use crate::services::risk::{RiskEngine, VerificationInfo};
use crate::services::security_log::{SecurityEventType, SecurityLogService};
use crate::services::session::{CreateSession, SessionManager, SessionManagerError};
use crate::services::sms_code::{SmsCodeError, SmsCodeService};
use crate::services::token::{IssueOptions, TokenAuthority, TokenError, TokenPair};
use crate::services::transports::EmailTransport;
use crate::services::two_factor::{TwoFactorError, TwoFactorService};
use crate::utils::auth_errors::{AuthError, FailureReason};
use crate::utils::device_fingerprint::DeviceInfo;
use crate::utils::password::{hash_password, verify_password};
use crate::utils::validation::{is_valid_phone, is_valid_username, validate_password_strength};

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
}

/// A fully authenticated login
#[derive(Debug)]
pub struct LoginSuccess {
    pub user: UserPublic,
    pub tokens: TokenPair,
    pub session: Session,
}

/// Outcome of a login attempt that passed credential verification
#[derive(Debug)]
pub enum LoginOutcome {
    Success(Box<LoginSuccess>),
    TwoFactorRequired {
        method: String,
        temp_session_id: Uuid,
        user_id: Uuid,
    },
    DeviceVerificationRequired {
        verification_info: VerificationInfo,
        temp_session_id: Uuid,
        user_id: Uuid,
    },
}

/// Aggregate logout report. Sibling revocations continue past individual
/// failures; the failures are reported, not raised.
#[derive(Debug, Default)]
pub struct LogoutSummary {
    pub tokens_revoked: usize,
    pub sessions_revoked: usize,
    pub failures: Vec<String>,
}

/// Request context threaded through the login flows
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

fn map_token_error(err: TokenError) -> AuthError {
    match err {
        TokenError::Expired => AuthError::unauthorized(FailureReason::TokenExpired),
        TokenError::Revoked => AuthError::unauthorized(FailureReason::TokenRevoked),
        TokenError::WrongType => AuthError::unauthorized(FailureReason::WrongTokenType),
        TokenError::InvalidSignature | TokenError::InvalidToken => {
            AuthError::unauthorized(FailureReason::InvalidToken)
        }
        TokenError::Encoding(e) | TokenError::Cache(e) => AuthError::Internal(e),
    }
}

fn map_session_error(err: SessionManagerError) -> AuthError {
    match err {
        SessionManagerError::NotFound => AuthError::unauthorized(FailureReason::SessionInvalid),
        SessionManagerError::InvalidTransition { from, to } => {
            AuthError::Conflict(format!("invalid session transition {} -> {}", from, to))
        }
        SessionManagerError::Storage(e) | SessionManagerError::Pool(e) => AuthError::Internal(e),
    }
}

pub struct AuthOrchestrator {
    pool: DieselPool,
    tokens: Arc<TokenAuthority>,
    sessions: Arc<SessionManager>,
    devices: Arc<DeviceRegistry>,
    risk: Arc<RiskEngine>,
    two_factor: Arc<TwoFactorService>,
    sms_codes: Arc<SmsCodeService>,
    security_log: SecurityLogService,
    email: Arc<dyn EmailTransport>,
    session_settings: SessionSettings,
    bcrypt_cost: u32,
}

impl AuthOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DieselPool,
        tokens: Arc<TokenAuthority>,
        sessions: Arc<SessionManager>,
        devices: Arc<DeviceRegistry>,
        risk: Arc<RiskEngine>,
        two_factor: Arc<TwoFactorService>,
        sms_codes: Arc<SmsCodeService>,
        security_log: SecurityLogService,
        email: Arc<dyn EmailTransport>,
        session_settings: SessionSettings,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            pool,
            tokens,
            sessions,
            devices,
            risk,
            two_factor,
            sms_codes,
            security_log,
            email,
            session_settings,
            bcrypt_cost,
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
        AuthError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Register a new account. Welcome email is best-effort.
    pub async fn register(&self, input: RegisterInput) -> Result<UserPublic, AuthError> {
        if !is_valid_username(&input.username) {
            return Err(AuthError::BadRequest(
                "Username must be 3-64 characters of letters, digits or underscore".to_string(),
            ));
        }
        if let Some(phone) = input.phone.as_deref() {
            if !is_valid_phone(phone) {
                return Err(AuthError::BadRequest("Invalid phone number".to_string()));
            }
        }
        validate_password_strength(&input.password).map_err(AuthError::BadRequest)?;

        let mut conn = self.conn().await?;
        let taken = User::identifier_taken(
            &mut conn,
            &input.username,
            input.email.as_deref(),
            input.phone.as_deref(),
        )
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
        if taken {
            return Err(AuthError::Conflict(
                "Username, email or phone is already registered".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password, self.bcrypt_cost)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let user = User::create(
            &mut conn,
            NewUser {
                username: input.username.clone(),
                email: input.email.as_ref().map(|e| e.to_lowercase()),
                phone: input.phone.clone(),
                password_hash,
                status: UserStatus::Active.as_str().to_string(),
                role: "user".to_string(),
            },
        )
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
        drop(conn);

        if let Some(email) = user.email.as_deref() {
            if let Err(e) = self.email.send_welcome(email, &user.username).await {
                warn!("Welcome email failed for {}: {}", user.id, e);
            }
        }

        self.security_log
            .log(
                SecurityEventType::UserRegistered,
                Some(user.id),
                serde_json::json!({ "username": user.username }),
            )
            .await;

        Ok(UserPublic::from(&user))
    }

    /// Password login. The flow either completes, or parks the caller in a
    /// temp session awaiting a second factor or device verification.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        device_info: &DeviceInfo,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let ip = ctx.ip.as_deref();
        let ua = ctx.user_agent.as_deref();

        // 1. Resolve the identifier
        let mut conn = self.conn().await?;
        let user = match User::find_by_identifier(&mut conn, identifier).await {
            Ok(user) => user,
            Err(UserError::NotFound) => {
                drop(conn);
                self.risk
                    .record_login_failure(None, "user_not_found", ip, ua)
                    .await;
                return Err(AuthError::unauthorized(FailureReason::UserNotFound));
            }
            Err(e) => return Err(AuthError::Internal(e.to_string())),
        };
        drop(conn);

        // 2. Account must be active
        if !user.is_active() {
            self.risk
                .record_login_failure(Some(user.id), "account_disabled", ip, ua)
                .await;
            return Err(AuthError::Forbidden("Account is disabled".to_string()));
        }

        // 3. Password check; the response is identical to the unknown-user
        // case so accounts cannot be enumerated
        let password_ok = verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !password_ok {
            self.risk
                .record_login_failure(Some(user.id), "invalid_password", ip, ua)
                .await;
            return Err(AuthError::unauthorized(FailureReason::InvalidPassword));
        }

        // 4. Device policy
        let outcome = self
            .risk
            .process_login_security(&user, device_info)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if outcome.verification_required {
            let info = match outcome.verification_info {
                Some(info) => info,
                None => {
                    return Err(AuthError::Internal(
                        "verification required without delivery channel".to_string(),
                    ))
                }
            };
            let temp = self
                .create_temp_session(
                    &user,
                    device_info,
                    ctx,
                    SessionStatus::PendingDeviceVerification,
                    self.session_settings.pending_device_verification_ttl,
                )
                .await?;
            self.send_device_verification_code(&user).await;

            return Ok(LoginOutcome::DeviceVerificationRequired {
                verification_info: info,
                temp_session_id: temp.id,
                user_id: user.id,
            });
        }

        // 5. Second factor
        if user.two_factor_enabled {
            let temp = self
                .create_temp_session(
                    &user,
                    device_info,
                    ctx,
                    SessionStatus::Pending2fa,
                    self.session_settings.pending_two_factor_ttl,
                )
                .await?;

            return Ok(LoginOutcome::TwoFactorRequired {
                method: user
                    .two_factor_method
                    .clone()
                    .unwrap_or_else(|| "totp".to_string()),
                temp_session_id: temp.id,
                user_id: user.id,
            });
        }

        // 6. Straight through: register the device if unseen, then finish
        let device = match outcome.device {
            Some(device) => device,
            None => self
                .devices
                .register(user.id, device_info, false)
                .await
                .map_err(|e| AuthError::Internal(e.to_string()))?,
        };

        let duration = if device.is_trusted {
            self.session_settings.trusted_device_duration
        } else {
            self.session_settings.default_duration
        };

        let success = self
            .complete_login(&user, device.id, device_info, ctx, duration)
            .await?;
        Ok(LoginOutcome::Success(Box::new(success)))
    }

    /// Second step of a 2FA login. Accepts a TOTP code or a recovery code.
    pub async fn verify_two_factor_and_login(
        &self,
        user_id: Uuid,
        temp_session_id: Uuid,
        code: &str,
        remember_device: bool,
        device_info: &DeviceInfo,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let ip = ctx.ip.as_deref();
        let ua = ctx.user_agent.as_deref();

        let temp = self
            .load_temp_session(user_id, temp_session_id, SessionStatus::Pending2fa)
            .await?;

        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AuthError::unauthorized(FailureReason::SessionInvalid))?;
        drop(conn);

        // TOTP first, recovery code fallback; TWO_FACTOR_FAILED is logged
        // by the two-factor service
        match self.two_factor.verify(&user, code).await {
            Ok(_) => {}
            Err(TwoFactorError::InvalidCode) | Err(TwoFactorError::NotEnabled) => {
                self.risk
                    .record_login_failure(Some(user.id), "invalid_2fa_code", ip, ua)
                    .await;
                return Err(AuthError::unauthorized(FailureReason::InvalidTwoFactorCode));
            }
            Err(e) => return Err(AuthError::Internal(e.to_string())),
        }

        // Device policy may still demand verification with the effective
        // device info
        let outcome = self
            .risk
            .process_login_security(&user, device_info)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if outcome.verification_required {
            let info = match outcome.verification_info {
                Some(info) => info,
                None => {
                    return Err(AuthError::Internal(
                        "verification required without delivery channel".to_string(),
                    ))
                }
            };
            self.sessions
                .update_status(
                    temp.id,
                    SessionStatus::PendingDeviceVerification,
                    Some(self.session_settings.pending_device_verification_ttl),
                )
                .await
                .map_err(map_session_error)?;
            self.send_device_verification_code(&user).await;

            return Ok(LoginOutcome::DeviceVerificationRequired {
                verification_info: info,
                temp_session_id: temp.id,
                user_id: user.id,
            });
        }

        let success = self
            .promote_temp_session(&user, temp, remember_device, device_info, ctx)
            .await?;
        Ok(LoginOutcome::Success(Box::new(success)))
    }

    /// Second step of a device-verification login: check the SMS code, then
    /// finish like the post-2FA path.
    pub async fn verify_device_and_login(
        &self,
        user_id: Uuid,
        temp_session_id: Uuid,
        code: &str,
        trust_device: bool,
        device_info: &DeviceInfo,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let ip = ctx.ip.as_deref();
        let ua = ctx.user_agent.as_deref();

        let temp = self
            .load_temp_session(
                user_id,
                temp_session_id,
                SessionStatus::PendingDeviceVerification,
            )
            .await?;

        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AuthError::unauthorized(FailureReason::SessionInvalid))?;
        drop(conn);

        let phone = user
            .phone
            .as_deref()
            .ok_or_else(|| AuthError::unauthorized(FailureReason::SessionInvalid))?;

        match self.sms_codes.verify_code(phone, code).await {
            Ok(()) => {}
            Err(SmsCodeError::TooManyAttempts) => {
                return Err(AuthError::RateLimited {
                    retry_after_seconds: 60,
                });
            }
            Err(SmsCodeError::Throttled {
                retry_after_seconds,
            }) => {
                return Err(AuthError::RateLimited {
                    retry_after_seconds,
                });
            }
            Err(SmsCodeError::InvalidCode) | Err(SmsCodeError::CodeExpired) => {
                self.risk
                    .record_login_failure(Some(user.id), "invalid_device_code", ip, ua)
                    .await;
                return Err(AuthError::unauthorized(
                    FailureReason::InvalidVerificationCode,
                ));
            }
            Err(e) => return Err(AuthError::Internal(e.to_string())),
        }

        // A verified device may still owe a second factor
        if user.two_factor_enabled {
            self.sessions
                .update_status(
                    temp.id,
                    SessionStatus::Pending2fa,
                    Some(self.session_settings.pending_two_factor_ttl),
                )
                .await
                .map_err(map_session_error)?;

            return Ok(LoginOutcome::TwoFactorRequired {
                method: user
                    .two_factor_method
                    .clone()
                    .unwrap_or_else(|| "totp".to_string()),
                temp_session_id: temp.id,
                user_id: user.id,
            });
        }

        let success = self
            .promote_temp_session(&user, temp, trust_device, device_info, ctx)
            .await?;
        Ok(LoginOutcome::Success(Box::new(success)))
    }

    /// Rotate a refresh token: revoke-before-issue makes a racing second
    /// refresh on the same token fail as revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .await
            .map_err(map_token_error)?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::unauthorized(FailureReason::InvalidToken))?;

        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AuthError::unauthorized(FailureReason::InvalidToken))?;
        drop(conn);

        match user.status_enum() {
            UserStatus::Active => {}
            _ => return Err(AuthError::Forbidden("Account is disabled".to_string())),
        }

        // Revoke the old refresh jti before minting replacements
        self.tokens
            .revoke_jti(&claims.jti, Some(&claims.sub))
            .await
            .map_err(map_token_error)?;

        let session_id = claims.sid.as_deref().and_then(|s| Uuid::parse_str(s).ok());
        let device_id = claims.did.as_deref().and_then(|d| Uuid::parse_str(d).ok());

        let pair = self
            .tokens
            .issue_tokens(
                &user,
                IssueOptions {
                    session_id,
                    device_id,
                    ..Default::default()
                },
            )
            .await
            .map_err(map_token_error)?;

        if let Some(sid) = session_id {
            if let Err(e) = self.sessions.bind_token(sid, &pair.jti, device_id).await {
                warn!("Failed to rebind session {} after refresh: {}", sid, e);
            }
            if let Err(e) = self.sessions.update_activity(sid).await {
                warn!("Failed to touch session {} after refresh: {}", sid, e);
            }
        }

        self.security_log
            .log(
                SecurityEventType::TokenRefreshed,
                Some(user.id),
                serde_json::json!({ "session_id": claims.sid }),
            )
            .await;

        Ok(pair)
    }

    /// Logout. Partial failures are aggregated; siblings always run.
    pub async fn logout(
        &self,
        user_id: Uuid,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        all_devices: bool,
    ) -> Result<LogoutSummary, AuthError> {
        let mut summary = LogoutSummary::default();

        if all_devices {
            match self.tokens.revoke_all(user_id).await {
                Ok(count) => summary.tokens_revoked = count,
                Err(e) => summary.failures.push(format!("token revocation: {}", e)),
            }
            match self.sessions.revoke_all(user_id, None, "logout_all").await {
                Ok(count) => summary.sessions_revoked = count,
                Err(e) => summary.failures.push(format!("session revocation: {}", e)),
            }
        } else {
            let mut session_id: Option<Uuid> = None;

            if let Some(token) = access_token {
                // Pull the bound session out of the claims before revoking.
                // The lenient decode keeps the session revocable even when
                // the access token itself has already expired.
                match self.tokens.claims_for_revocation(token) {
                    Ok(claims) => {
                        session_id = claims.sid.as_deref().and_then(|s| Uuid::parse_str(s).ok());
                    }
                    Err(e) => summary.failures.push(format!("access claims: {}", e)),
                }
                match self.tokens.revoke_token(token).await {
                    Ok(_) => summary.tokens_revoked += 1,
                    Err(e) => summary.failures.push(format!("access token: {}", e)),
                }
            }

            if let Some(token) = refresh_token {
                match self.tokens.revoke_token(token).await {
                    Ok(_) => summary.tokens_revoked += 1,
                    Err(e) => summary.failures.push(format!("refresh token: {}", e)),
                }
            }

            if let Some(sid) = session_id {
                match self.sessions.revoke(sid, "logout").await {
                    Ok(_) => summary.sessions_revoked += 1,
                    Err(e) => summary.failures.push(format!("session: {}", e)),
                }
            }
        }

        self.security_log
            .log(
                SecurityEventType::Logout,
                Some(user_id),
                serde_json::json!({
                    "all_devices": all_devices,
                    "tokens_revoked": summary.tokens_revoked,
                    "sessions_revoked": summary.sessions_revoked,
                }),
            )
            .await;

        Ok(summary)
    }

    /// Request a password reset. Always succeeds from the caller's view;
    /// whether the account exists is never revealed.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let mut conn = self.conn().await?;
        let user = match User::find_by_identifier(&mut conn, email).await {
            Ok(user) => user,
            Err(UserError::NotFound) => {
                tracing::info!("Password reset requested for unknown email");
                return Ok(());
            }
            Err(e) => return Err(AuthError::Internal(e.to_string())),
        };
        drop(conn);

        let destination = match user.email.as_deref() {
            Some(email) => email.to_string(),
            None => return Ok(()),
        };

        let token = self
            .tokens
            .issue_password_reset(user.id, &destination)
            .await
            .map_err(map_token_error)?;

        // Delivery is handed to the email collaborator; a delivery failure
        // must not reveal anything to the caller either
        if let Err(e) = self
            .email
            .send_password_reset(&destination, &token, &user.username)
            .await
        {
            warn!("Password reset email failed for {}: {}", user.id, e);
        }

        self.security_log
            .log(
                SecurityEventType::PasswordResetRequested,
                Some(user.id),
                serde_json::json!({}),
            )
            .await;

        Ok(())
    }

    /// Confirm a password reset: rehash, invalidate the reset token, and
    /// revoke every outstanding token for the account.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let claims = self
            .tokens
            .verify_password_reset(token)
            .await
            .map_err(map_token_error)?;

        validate_password_strength(new_password).map_err(AuthError::BadRequest)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::unauthorized(FailureReason::InvalidToken))?;

        let password_hash = hash_password(new_password, self.bcrypt_cost)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let mut conn = self.conn().await?;
        User::update(
            &mut conn,
            user_id,
            UserUpdate {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
        drop(conn);

        self.tokens
            .consume_password_reset(user_id, &claims.jti)
            .await
            .map_err(map_token_error)?;

        // A reset invalidates every outstanding credential
        self.tokens
            .revoke_all(user_id)
            .await
            .map_err(map_token_error)?;

        self.security_log
            .log(
                SecurityEventType::PasswordResetCompleted,
                Some(user_id),
                serde_json::json!({}),
            )
            .await;

        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn create_temp_session(
        &self,
        user: &User,
        device_info: &DeviceInfo,
        ctx: &RequestContext,
        status: SessionStatus,
        ttl: u64,
    ) -> Result<Session, AuthError> {
        self.sessions
            .create(CreateSession {
                user_id: user.id,
                token_id: None,
                device_id: None,
                device_info: Some(device_info.clone()),
                ip: ctx.ip.clone(),
                user_agent: ctx.user_agent.clone(),
                status,
                expires_in: ttl,
            })
            .await
            .map_err(map_session_error)
    }

    async fn load_temp_session(
        &self,
        user_id: Uuid,
        temp_session_id: Uuid,
        expected: SessionStatus,
    ) -> Result<Session, AuthError> {
        let session = self
            .sessions
            .get(temp_session_id)
            .await
            .map_err(|_| AuthError::unauthorized(FailureReason::SessionInvalid))?;

        if session.user_id != user_id
            || session.status_enum() != expected
            || session.expires_at <= chrono::Utc::now()
        {
            return Err(AuthError::unauthorized(FailureReason::SessionInvalid));
        }
        Ok(session)
    }

    async fn send_device_verification_code(&self, user: &User) {
        if let Some(phone) = user.phone.as_deref() {
            if let Err(e) = self.sms_codes.send_code(phone).await {
                warn!("Device verification code delivery failed for {}: {}", user.id, e);
            }
        }
    }

    /// Finish a login from scratch with an already-registered device.
    async fn complete_login(
        &self,
        user: &User,
        device_id: Uuid,
        device_info: &DeviceInfo,
        ctx: &RequestContext,
        duration: u64,
    ) -> Result<LoginSuccess, AuthError> {
        let session = self
            .sessions
            .create(CreateSession {
                user_id: user.id,
                token_id: None,
                device_id: Some(device_id),
                device_info: Some(device_info.clone()),
                ip: ctx.ip.clone(),
                user_agent: ctx.user_agent.clone(),
                status: SessionStatus::Active,
                expires_in: duration,
            })
            .await
            .map_err(map_session_error)?;

        self.issue_and_finish(user, session, device_id, ctx).await
    }

    /// Promote a temp session to active, registering and optionally
    /// trusting the device.
    async fn promote_temp_session(
        &self,
        user: &User,
        temp: Session,
        trust_device: bool,
        device_info: &DeviceInfo,
        ctx: &RequestContext,
    ) -> Result<LoginSuccess, AuthError> {
        let device = self
            .devices
            .register_and_trust(user.id, device_info, trust_device)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let duration = if trust_device || device.is_trusted {
            self.session_settings.trusted_device_duration
        } else {
            self.session_settings.default_duration
        };

        let session = self
            .sessions
            .update_status(temp.id, SessionStatus::Active, Some(duration))
            .await
            .map_err(map_session_error)?;

        self.sessions
            .ensure_current(user.id, session.id)
            .await
            .map_err(map_session_error)?;

        self.issue_and_finish(user, session, device.id, ctx).await
    }

    /// Shared tail of every successful login: bind tokens, stamp the user,
    /// record the event.
    async fn issue_and_finish(
        &self,
        user: &User,
        session: Session,
        device_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<LoginSuccess, AuthError> {
        let pair = self
            .tokens
            .issue_tokens(
                user,
                IssueOptions {
                    session_id: Some(session.id),
                    device_id: Some(device_id),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_token_error)?;

        let session = self
            .sessions
            .bind_token(session.id, &pair.jti, Some(device_id))
            .await
            .map_err(map_session_error)?;

        let mut conn = self.conn().await?;
        if let Err(e) = User::touch_last_login(&mut conn, user.id).await {
            warn!("Failed to stamp last login for {}: {}", user.id, e);
        }
        drop(conn);

        self.risk
            .record_login_success(
                user.id,
                ctx.ip.as_deref(),
                ctx.user_agent.as_deref(),
                Some(session.id),
                Some(device_id),
            )
            .await;

        Ok(LoginSuccess {
            user: UserPublic::from(user),
            tokens: pair,
            session,
        })
    }
}
