// Two-factor service: TOTP provisioning/verification (RFC 6238, 30s step,
// 6 digits, window of one step either side) and single-use recovery codes
// stored as bcrypt hashes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use totp_rs::{Algorithm as TotpAlgorithm, Secret, TOTP};
use tracing::warn;
use uuid::Uuid;

use crate::db::{DieselPool, RedisPool};
use crate::models::recovery_code::{NewRecoveryCode, RecoveryCode};
use crate::models::user::{TwoFactorMethod, User, UserError, UserUpdate};
use crate::services::security_log::{SecurityEventType, SecurityLogService};
use crate::utils::password::{hash_password, verify_password};
use crate::utils::recovery_codes::generate_recovery_codes;

/// TTL for a pending provisioning blob at 2fa_setup:{user}:{setup}
const SETUP_TTL_SECONDS: u64 = 600;

/// Default number of recovery codes per batch
const RECOVERY_CODE_COUNT: usize = 10;

#[derive(Error, Debug)]
pub enum TwoFactorError {
    #[error("Two-factor authentication is not enabled")]
    NotEnabled,

    #[error("Setup not found or expired")]
    SetupExpired,

    #[error("Invalid code")]
    InvalidCode,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("TOTP error: {0}")]
    Totp(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<UserError> for TwoFactorError {
    fn from(err: UserError) -> Self {
        TwoFactorError::Storage(err.to_string())
    }
}

/// Result of a provisioning call: the secret and its otpauth/QR forms are
/// shown once and never persisted outside the pending setup blob.
#[derive(Debug, Serialize)]
pub struct ProvisionedSetup {
    pub setup_id: Uuid,
    pub secret: String,
    pub otpauth_url: String,
    pub qr_data_uri: String,
}

/// Pending setup blob stored in the cache until activation
#[derive(Debug, Serialize, Deserialize)]
struct PendingSetup {
    secret: String,
    url: String,
    created_at: i64,
}

/// Outcome of a second-factor verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorOutcome {
    Totp,
    RecoveryCode,
}

/// Build a TOTP instance from an encoded secret. 30-second steps, six
/// digits, skew of one step either side.
fn build_totp(
    secret_base32: &str,
    issuer: &str,
    account: &str,
) -> Result<TOTP, TwoFactorError> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| TwoFactorError::Totp(format!("{:?}", e)))?;

    TOTP::new(
        TotpAlgorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| TwoFactorError::Totp(format!("{:?}", e)))
}

pub struct TwoFactorService {
    pool: DieselPool,
    redis_pool: RedisPool,
    security_log: SecurityLogService,
    issuer: String,
    bcrypt_cost: u32,
}

impl TwoFactorService {
    pub fn new(
        pool: DieselPool,
        redis_pool: RedisPool,
        security_log: SecurityLogService,
        issuer: String,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            pool,
            redis_pool,
            security_log,
            issuer,
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
        TwoFactorError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| TwoFactorError::Pool(e.to_string()))
    }

    fn setup_key(user_id: Uuid, setup_id: Uuid) -> String {
        format!("2fa_setup:{}:{}", user_id, setup_id)
    }

    /// Generate a fresh secret and park it in a pending setup blob. The
    /// account's stored secret is untouched until activation succeeds.
    pub async fn provision(
        &self,
        user_id: Uuid,
        username: &str,
    ) -> Result<ProvisionedSetup, TwoFactorError> {
        // to_encoded always yields the base32 variant
        let secret = match Secret::generate_secret().to_encoded() {
            Secret::Encoded(encoded) => encoded,
            Secret::Raw(_) => {
                return Err(TwoFactorError::Totp("secret encoding failed".to_string()))
            }
        };

        let totp = build_totp(&secret, &self.issuer, username)?;
        let otpauth_url = totp.get_url();
        let qr_data_uri = format!(
            "data:image/png;base64,{}",
            totp.get_qr_base64()
                .map_err(|e| TwoFactorError::Totp(e.to_string()))?
        );

        let setup_id = Uuid::new_v4();
        let blob = PendingSetup {
            secret: secret.clone(),
            url: otpauth_url.clone(),
            created_at: Utc::now().timestamp(),
        };
        let serialized =
            serde_json::to_string(&blob).map_err(|e| TwoFactorError::Cache(e.to_string()))?;

        self.redis_pool
            .set_with_expiry(
                &Self::setup_key(user_id, setup_id),
                serialized,
                SETUP_TTL_SECONDS,
            )
            .await
            .map_err(|e| TwoFactorError::Cache(e.to_string()))?;

        self.security_log
            .log(
                SecurityEventType::TwoFactorEnabled,
                Some(user_id),
                serde_json::json!({ "status": "pending", "method": "totp" }),
            )
            .await;

        Ok(ProvisionedSetup {
            setup_id,
            secret,
            otpauth_url,
            qr_data_uri,
        })
    }

    /// Activate TOTP: verify the first code against the pending secret,
    /// persist it on the account, and mint recovery codes. Returns the
    /// plaintext recovery codes - the only time they are visible.
    pub async fn activate_totp(
        &self,
        user_id: Uuid,
        setup_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, TwoFactorError> {
        let setup_key = Self::setup_key(user_id, setup_id);
        let blob: PendingSetup = match self
            .redis_pool
            .get_string(&setup_key)
            .await
            .map_err(|e| TwoFactorError::Cache(e.to_string()))?
        {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| TwoFactorError::Cache(e.to_string()))?
            }
            None => return Err(TwoFactorError::SetupExpired),
        };

        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id).await?;

        let totp = build_totp(&blob.secret, &self.issuer, &user.username)?;
        let valid = totp
            .check_current(code)
            .map_err(|e| TwoFactorError::Totp(e.to_string()))?;
        if !valid {
            return Err(TwoFactorError::InvalidCode);
        }

        User::update(
            &mut conn,
            user_id,
            UserUpdate {
                two_factor_enabled: Some(true),
                two_factor_secret: Some(Some(blob.secret)),
                two_factor_method: Some(Some(TwoFactorMethod::Totp.as_str().to_string())),
                ..Default::default()
            },
        )
        .await?;
        drop(conn);

        let codes = self.generate_recovery_codes(user_id, RECOVERY_CODE_COUNT, true).await?;

        self.redis_pool.del(&setup_key).await.ok();

        self.security_log
            .log(
                SecurityEventType::TwoFactorEnabled,
                Some(user_id),
                serde_json::json!({ "status": "active", "method": "totp" }),
            )
            .await;

        Ok(codes)
    }

    /// Verify a TOTP code for an already loaded user record.
    pub fn verify_totp_for_user(&self, user: &User, code: &str) -> Result<bool, TwoFactorError> {
        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled);
        }
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or(TwoFactorError::NotEnabled)?;

        let totp = build_totp(secret, &self.issuer, &user.username)?;
        totp.check_current(code)
            .map_err(|e| TwoFactorError::Totp(e.to_string()))
    }

    /// Verify a second factor: TOTP first, recovery code as fallback.
    pub async fn verify(
        &self,
        user: &User,
        code: &str,
    ) -> Result<TwoFactorOutcome, TwoFactorError> {
        match self.verify_totp_for_user(user, code) {
            Ok(true) => {
                self.security_log
                    .log(
                        SecurityEventType::TwoFactorVerified,
                        Some(user.id),
                        serde_json::json!({ "method": "totp" }),
                    )
                    .await;
                return Ok(TwoFactorOutcome::Totp);
            }
            Ok(false) => {}
            Err(TwoFactorError::NotEnabled) => return Err(TwoFactorError::NotEnabled),
            Err(e) => warn!("TOTP verification error for {}: {}", user.id, e),
        }

        if self.verify_recovery_code(user.id, code).await? {
            return Ok(TwoFactorOutcome::RecoveryCode);
        }

        self.security_log
            .log(
                SecurityEventType::TwoFactorFailed,
                Some(user.id),
                serde_json::json!({}),
            )
            .await;
        Err(TwoFactorError::InvalidCode)
    }

    /// Verify by user id, loading the record first.
    pub async fn verify_by_user_id(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<TwoFactorOutcome, TwoFactorError> {
        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id).await?;
        drop(conn);
        self.verify(&user, code).await
    }

    /// Disable 2FA after password re-verification. Clears the secret and
    /// deletes every recovery code.
    pub async fn disable(&self, user_id: Uuid, password: &str) -> Result<(), TwoFactorError> {
        let mut conn = self.conn().await?;
        let user = User::find_by_id(&mut conn, user_id).await?;

        let password_ok = verify_password(password, &user.password_hash)
            .map_err(|e| TwoFactorError::Storage(e.to_string()))?;
        if !password_ok {
            return Err(TwoFactorError::InvalidPassword);
        }

        User::update(
            &mut conn,
            user_id,
            UserUpdate {
                two_factor_enabled: Some(false),
                two_factor_secret: Some(None),
                two_factor_method: Some(None),
                ..Default::default()
            },
        )
        .await?;

        RecoveryCode::delete_all_for_user(&mut conn, user_id)
            .await
            .map_err(|e| TwoFactorError::Storage(e.to_string()))?;
        drop(conn);

        self.security_log
            .log(
                SecurityEventType::TwoFactorDisabled,
                Some(user_id),
                serde_json::json!({}),
            )
            .await;

        Ok(())
    }

    /// Generate a recovery code batch. When replacing, prior codes are
    /// deleted first so only the returned batch remains valid.
    pub async fn generate_recovery_codes(
        &self,
        user_id: Uuid,
        count: usize,
        replace_existing: bool,
    ) -> Result<Vec<String>, TwoFactorError> {
        let codes = generate_recovery_codes(count);

        let mut hashed = Vec::with_capacity(codes.len());
        for code in &codes {
            let code_hash = hash_password(code, self.bcrypt_cost)
                .map_err(|e| TwoFactorError::Storage(e.to_string()))?;
            hashed.push(NewRecoveryCode { user_id, code_hash });
        }

        let mut conn = self.conn().await?;
        if replace_existing {
            RecoveryCode::delete_all_for_user(&mut conn, user_id)
                .await
                .map_err(|e| TwoFactorError::Storage(e.to_string()))?;
        }
        RecoveryCode::insert_batch(&mut conn, hashed)
            .await
            .map_err(|e| TwoFactorError::Storage(e.to_string()))?;

        Ok(codes)
    }

    /// Try a recovery code against the user's unused codes. The first match
    /// is consumed; used codes never verify again.
    pub async fn verify_recovery_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<bool, TwoFactorError> {
        let mut conn = self.conn().await?;
        let candidates = RecoveryCode::unused_for_user(&mut conn, user_id)
            .await
            .map_err(|e| TwoFactorError::Storage(e.to_string()))?;

        for candidate in candidates {
            let matches = verify_password(code, &candidate.code_hash)
                .map_err(|e| TwoFactorError::Storage(e.to_string()))?;
            if matches {
                let consumed = RecoveryCode::mark_used(&mut conn, candidate.id)
                    .await
                    .map_err(|e| TwoFactorError::Storage(e.to_string()))?;
                if !consumed {
                    // Lost the race to a concurrent verification
                    return Ok(false);
                }
                drop(conn);

                self.security_log
                    .log(
                        SecurityEventType::RecoveryCodeUsed,
                        Some(user_id),
                        serde_json::json!({}),
                    )
                    .await;
                return Ok(true);
            }
        }

        Ok(false)
    }
}
