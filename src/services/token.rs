// Token authority: mints, verifies and revokes the service's bearer
// credentials. All tokens are HS256 JWTs carrying a unique jti; revocation
// is a KVC blacklist entry that outlives the token by a safety margin.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use crate::app_config::JwtSettings;
use crate::db::RedisPool;
use crate::models::auth::{
    AccessTokenClaims, RefreshTokenClaims, ResetTokenClaims, TOKEN_TYPE_ACCESS,
    TOKEN_TYPE_REFRESH, TOKEN_TYPE_RESET,
};
use crate::models::user::User;
use crate::services::security_log::{SecurityEventType, SecurityLogService};

/// Extra time a blacklist entry outlives the token it revokes, to absorb
/// clock skew between issuers and verifiers.
const BLACKLIST_SLACK_SECONDS: u64 = 60;

/// Minimum blacklist TTL when the token's remaining lifetime is unknown.
const BLACKLIST_FLOOR_SECONDS: u64 = 3600;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Wrong token type")]
    WrongType,

    #[error("Token revoked")]
    Revoked,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token encoding error: {0}")]
    Encoding(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::InvalidSignature
            }
            ErrorKind::Json(_) | ErrorKind::Base64(_) | ErrorKind::InvalidToken => {
                TokenError::InvalidToken
            }
            _ => TokenError::InvalidToken,
        }
    }
}

impl From<redis::RedisError> for TokenError {
    fn from(err: redis::RedisError) -> Self {
        TokenError::Cache(err.to_string())
    }
}

/// Token signing configuration with prebuilt keys
#[derive(Clone)]
pub struct TokenConfig {
    pub access_expiry: u64,
    pub refresh_expiry: u64,
    pub reset_expiry: u64,
    pub audience: String,
    pub issuer: String,
    pub algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .field("reset_expiry", &self.reset_expiry)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm)
            .field("encoding_key", &"<redacted>")
            .field("decoding_key", &"<redacted>")
            .finish()
    }
}

impl TokenConfig {
    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self {
            access_expiry: settings.access_expiry,
            refresh_expiry: settings.refresh_expiry,
            reset_expiry: settings.reset_expiry,
            audience: settings.audience.clone(),
            issuer: settings.issuer.clone(),
            // HS256 is the only accepted algorithm; "none" and asymmetric
            // headers fail verification.
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
        }
    }

    /// Deterministic config for tests that never touches the global CONFIG.
    pub fn for_test() -> Self {
        Self::from_settings(&JwtSettings {
            secret: "test-signing-secret-with-enough-length".to_string(),
            access_expiry: 86400,
            refresh_expiry: 604800,
            reset_expiry: 1800,
            audience: "https://suoke.life".to_string(),
            issuer: "suoke-auth-service".to_string(),
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation
    }
}

/// Options for a token issuance
#[derive(Debug, Default, Clone)]
pub struct IssueOptions {
    pub session_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub access_ttl: Option<u64>,
    pub refresh_ttl: Option<u64>,
    pub permissions_snapshot: Option<Vec<String>>,
}

/// Claims recovered for revocation paths. The signature is verified but
/// expiry is ignored: an expired token must still revoke cleanly, and its
/// session binding must still be recoverable.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RevocableClaims {
    pub sub: String,
    pub jti: String,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
}

/// The issued credential pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
    pub jti: String,
    pub refresh_jti: String,
}

pub struct TokenAuthority {
    config: TokenConfig,
    redis_pool: Option<RedisPool>,
    security_log: Option<SecurityLogService>,
}

impl TokenAuthority {
    /// Create a token authority without cache integration. Blacklist and
    /// metadata bookkeeping are skipped; signature and claim checks still
    /// apply. Used in tests.
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            redis_pool: None,
            security_log: None,
        }
    }

    pub fn with_cache(
        config: TokenConfig,
        redis_pool: RedisPool,
        security_log: SecurityLogService,
    ) -> Self {
        Self {
            config,
            redis_pool: Some(redis_pool),
            security_log: Some(security_log),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(self.config.algorithm), claims, &self.config.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let data = decode::<T>(token, &self.config.decoding_key, &self.config.validation())?;
        Ok(data.claims)
    }

    /// Decode ignoring expiry, for revocation paths that must accept
    /// already-expired tokens. The signature is still verified.
    fn decode_claims_lenient<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = self.config.validation();
        validation.validate_exp = false;
        let data = decode::<T>(token, &self.config.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Record token metadata and membership in the per-user jti set.
    async fn track_issued_jti(
        &self,
        jti: &str,
        user_id: Uuid,
        opts: &IssueOptions,
        issued_at: u64,
        expires_at: u64,
        ttl: u64,
    ) -> Result<(), TokenError> {
        let pool = match &self.redis_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let fields = vec![
            ("user_id".to_string(), user_id.to_string()),
            (
                "session_id".to_string(),
                opts.session_id.map(|s| s.to_string()).unwrap_or_default(),
            ),
            (
                "device_id".to_string(),
                opts.device_id.map(|d| d.to_string()).unwrap_or_default(),
            ),
            ("created_at".to_string(), issued_at.to_string()),
            ("expires_at".to_string(), expires_at.to_string()),
        ];

        pool.hset_all_with_expiry(&format!("token:{}", jti), fields, ttl)
            .await?;
        pool.sadd(&format!("user_tokens:{}", user_id), jti).await?;
        Ok(())
    }

    /// Issue an access/refresh pair for a user.
    pub async fn issue_tokens(
        &self,
        user: &User,
        opts: IssueOptions,
    ) -> Result<TokenPair, TokenError> {
        let now = Self::now();
        let access_ttl = opts.access_ttl.unwrap_or(self.config.access_expiry);
        let refresh_ttl = opts.refresh_ttl.unwrap_or(self.config.refresh_expiry);

        let access_jti = Uuid::new_v4().to_string();
        let refresh_jti = Uuid::new_v4().to_string();
        let sid = opts.session_id.map(|s| s.to_string());
        let did = opts.device_id.map(|d| d.to_string());

        let access_claims = AccessTokenClaims {
            sub: user.id.to_string(),
            role: user.role.clone(),
            permissions: opts.permissions_snapshot.clone(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            iat: now,
            exp: now + access_ttl,
            jti: access_jti.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            sid: sid.clone(),
            did: did.clone(),
        };

        let refresh_claims = RefreshTokenClaims {
            sub: user.id.to_string(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            iat: now,
            exp: now + refresh_ttl,
            jti: refresh_jti.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            sid,
            did,
        };

        let access_token = self.encode_claims(&access_claims)?;
        let refresh_token = self.encode_claims(&refresh_claims)?;

        self.track_issued_jti(&access_jti, user.id, &opts, now, now + access_ttl, access_ttl)
            .await?;
        self.track_issued_jti(
            &refresh_jti,
            user.id,
            &opts,
            now,
            now + refresh_ttl,
            refresh_ttl,
        )
        .await?;

        if let Some(log) = &self.security_log {
            log.log(
                SecurityEventType::TokenIssued,
                Some(user.id),
                serde_json::json!({
                    "jti": access_claims.jti,
                    "session_id": access_claims.sid,
                    "device_id": access_claims.did,
                }),
            )
            .await;
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: access_ttl,
            refresh_expires_in: refresh_ttl,
            jti: access_jti,
            refresh_jti,
        })
    }

    async fn check_blacklist(&self, jti: &str) -> Result<(), TokenError> {
        if let Some(pool) = &self.redis_pool {
            if pool.exists(&format!("blacklist:{}", jti)).await? {
                return Err(TokenError::Revoked);
            }
        }
        Ok(())
    }

    /// Verify an access token: signature, algorithm, issuer, audience,
    /// expiry, type discriminator and blacklist.
    pub async fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let claims: AccessTokenClaims = self.decode_claims(token)?;
        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(TokenError::WrongType);
        }
        self.check_blacklist(&claims.jti).await?;
        Ok(claims)
    }

    /// Verify a refresh token with the same checks as access verification.
    pub async fn verify_refresh(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        let claims: RefreshTokenClaims = self.decode_claims(token)?;
        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(TokenError::WrongType);
        }
        self.check_blacklist(&claims.jti).await?;
        Ok(claims)
    }

    /// Revoke by jti. Blacklists for the token's remaining lifetime plus
    /// slack, floored to tolerate clock skew when the lifetime is unknown.
    /// Revoking an unknown or already-expired jti is a no-op success.
    pub async fn revoke_jti(&self, jti: &str, user_id: Option<&str>) -> Result<bool, TokenError> {
        let pool = match &self.redis_pool {
            Some(pool) => pool,
            None => return Ok(true),
        };

        let token_key = format!("token:{}", jti);
        let ttl = match pool.hget(&token_key, "expires_at").await? {
            Some(raw) => {
                let expires_at = raw.parse::<u64>().unwrap_or(0);
                let remaining = expires_at.saturating_sub(Self::now());
                (remaining + BLACKLIST_SLACK_SECONDS).max(BLACKLIST_FLOOR_SECONDS)
            }
            None => BLACKLIST_FLOOR_SECONDS,
        };

        // Resolve the owner from metadata when the caller does not know it
        let owner = match user_id {
            Some(uid) => Some(uid.to_string()),
            None => pool.hget(&token_key, "user_id").await?,
        };

        pool.set_with_expiry(&format!("blacklist:{}", jti), "1".to_string(), ttl)
            .await?;
        pool.del(&token_key).await?;

        if let Some(owner) = owner.filter(|o| !o.is_empty()) {
            pool.srem(&format!("user_tokens:{}", owner), jti).await?;
        }

        if let Some(log) = &self.security_log {
            log.log(
                SecurityEventType::TokenRevoked,
                user_id.and_then(|u| Uuid::parse_str(u).ok()),
                serde_json::json!({ "jti": jti }),
            )
            .await;
        }

        Ok(true)
    }

    /// Decode a token for revocation purposes only: signature, issuer and
    /// audience are checked, expiry is not. Never use the result as a
    /// bearer context.
    pub fn claims_for_revocation(&self, token: &str) -> Result<RevocableClaims, TokenError> {
        self.decode_claims_lenient(token)
    }

    /// Revoke a full token string. Expired tokens still revoke cleanly;
    /// tokens that fail signature verification are rejected.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, TokenError> {
        let claims = self.claims_for_revocation(token)?;
        self.revoke_jti(&claims.jti, Some(&claims.sub)).await
    }

    /// Revoke every live token of a user. Returns the number revoked.
    /// Idempotent: re-revoking already-revoked jtis succeeds.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<usize, TokenError> {
        let pool = match &self.redis_pool {
            Some(pool) => pool,
            None => return Ok(0),
        };

        let set_key = format!("user_tokens:{}", user_id);
        let jtis = pool.smembers(&set_key).await?;
        let count = jtis.len();

        let uid = user_id.to_string();
        for jti in &jtis {
            self.revoke_jti(jti, Some(&uid)).await?;
        }
        pool.del(&set_key).await?;

        Ok(count)
    }

    /// Issue a single-use password reset token. The stored jti pins the
    /// most recent issue: older reset tokens stop verifying once a new one
    /// is requested.
    pub async fn issue_password_reset(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<String, TokenError> {
        let now = Self::now();
        let jti = Uuid::new_v4().to_string();

        let claims = ResetTokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            token_type: TOKEN_TYPE_RESET.to_string(),
            iat: now,
            exp: now + self.config.reset_expiry,
            jti: jti.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let token = self.encode_claims(&claims)?;

        if let Some(pool) = &self.redis_pool {
            pool.set_with_expiry(
                &format!("password_reset:{}", user_id),
                jti,
                self.config.reset_expiry,
            )
            .await?;
        }

        Ok(token)
    }

    /// Verify a password reset token: standard claim checks, blacklist, and
    /// a constant-time match against the stored jti so a re-issued token
    /// invalidates every earlier one.
    pub async fn verify_password_reset(&self, token: &str) -> Result<ResetTokenClaims, TokenError> {
        let claims: ResetTokenClaims = self.decode_claims(token)?;
        if claims.token_type != TOKEN_TYPE_RESET {
            return Err(TokenError::WrongType);
        }
        self.check_blacklist(&claims.jti).await?;

        if let Some(pool) = &self.redis_pool {
            let stored = pool
                .get_string(&format!("password_reset:{}", claims.sub))
                .await?
                .ok_or(TokenError::Revoked)?;

            let matches: bool = stored.as_bytes().ct_eq(claims.jti.as_bytes()).into();
            if !matches {
                return Err(TokenError::Revoked);
            }
        }

        Ok(claims)
    }

    /// Consume a reset token after a successful password change: the stored
    /// jti is removed and the jti blacklisted for the reset window.
    pub async fn consume_password_reset(
        &self,
        user_id: Uuid,
        jti: &str,
    ) -> Result<(), TokenError> {
        if let Some(pool) = &self.redis_pool {
            pool.del(&format!("password_reset:{}", user_id)).await?;
            pool.set_with_expiry(
                &format!("blacklist:{}", jti),
                "1".to_string(),
                self.config.reset_expiry + BLACKLIST_SLACK_SECONDS,
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "zhang_wei".to_string(),
            email: Some("zhang@suoke.life".to_string()),
            phone: None,
            password_hash: "$2b$10$hash".to_string(),
            status: "active".to_string(),
            role: "knowledge_reader".to_string(),
            secondary_roles: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_method: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn authority() -> TokenAuthority {
        TokenAuthority::new(TokenConfig::for_test())
    }

    #[tokio::test]
    async fn test_issue_and_verify_round_trip() {
        let authority = authority();
        let user = test_user();
        let session_id = Uuid::new_v4();

        let pair = authority
            .issue_tokens(
                &user,
                IssueOptions {
                    session_id: Some(session_id),
                    permissions_snapshot: Some(vec!["knowledge:read".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(pair.expires_in, 86400);
        assert_eq!(pair.refresh_expires_in, 604800);

        let claims = authority.verify_access(&pair.access_token).await.unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "knowledge_reader");
        assert_eq!(claims.token_type, "access");
        assert_eq!(claims.jti, pair.jti);
        assert_eq!(claims.sid.as_deref(), Some(session_id.to_string().as_str()));
        assert_eq!(
            claims.permissions,
            Some(vec!["knowledge:read".to_string()])
        );
        assert_eq!(claims.exp - claims.iat, 86400);

        let refresh_claims = authority.verify_refresh(&pair.refresh_token).await.unwrap();
        assert_eq!(refresh_claims.token_type, "refresh");
        assert_eq!(refresh_claims.jti, pair.refresh_jti);
        assert_eq!(refresh_claims.sid.as_deref(), claims.sid.as_deref());
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access() {
        let authority = authority();
        let pair = authority
            .issue_tokens(&test_user(), IssueOptions::default())
            .await
            .unwrap();

        let result = authority.verify_access(&pair.refresh_token).await;
        assert!(matches!(result, Err(TokenError::WrongType)));

        let result = authority.verify_refresh(&pair.access_token).await;
        assert!(matches!(result, Err(TokenError::WrongType)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let authority = authority();
        let user = test_user();
        let now = TokenAuthority::now();

        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            role: user.role.clone(),
            permissions: None,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            iat: now - 7200,
            exp: now - 3600,
            jti: Uuid::new_v4().to_string(),
            iss: "suoke-auth-service".to_string(),
            aud: "https://suoke.life".to_string(),
            sid: None,
            did: None,
        };
        let token = authority.encode_claims(&claims).unwrap();

        let result = authority.verify_access(&token).await;
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let authority = authority();
        let pair = authority
            .issue_tokens(&test_user(), IssueOptions::default())
            .await
            .unwrap();

        let mut parts: Vec<&str> = pair.access_token.split('.').collect();
        let tampered_sig = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        parts[2] = tampered_sig;
        let tampered = parts.join(".");

        let result = authority.verify_access(&tampered).await;
        assert!(matches!(
            result,
            Err(TokenError::InvalidSignature) | Err(TokenError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_alg_none_rejected() {
        let authority = authority();
        let pair = authority
            .issue_tokens(&test_user(), IssueOptions::default())
            .await
            .unwrap();

        // Swap the header for {"alg":"none","typ":"JWT"} and empty signature
        use base64::Engine;
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = pair.access_token.split('.').nth(1).unwrap();
        let forged = format!("{}.{}.", header, payload);

        assert!(authority.verify_access(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let authority = authority();
        let other = TokenAuthority::new(TokenConfig::from_settings(&JwtSettings {
            secret: "test-signing-secret-with-enough-length".to_string(),
            access_expiry: 86400,
            refresh_expiry: 604800,
            reset_expiry: 1800,
            audience: "https://other.example".to_string(),
            issuer: "other-service".to_string(),
        }));

        let pair = other
            .issue_tokens(&test_user(), IssueOptions::default())
            .await
            .unwrap();

        assert!(authority.verify_access(&pair.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_still_yields_revocation_claims() {
        let authority = authority();
        let user = test_user();
        let session_id = Uuid::new_v4();
        let now = TokenAuthority::now();

        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            role: user.role.clone(),
            permissions: None,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            iat: now - 7200,
            exp: now - 3600,
            jti: Uuid::new_v4().to_string(),
            iss: "suoke-auth-service".to_string(),
            aud: "https://suoke.life".to_string(),
            sid: Some(session_id.to_string()),
            did: None,
        };
        let token = authority.encode_claims(&claims).unwrap();

        // Expired for bearer use, but the session binding is recoverable
        assert!(matches!(
            authority.verify_access(&token).await,
            Err(TokenError::Expired)
        ));

        let recovered = authority.claims_for_revocation(&token).unwrap();
        assert_eq!(recovered.sub, user.id.to_string());
        assert_eq!(recovered.jti, claims.jti);
        assert_eq!(recovered.sid.as_deref(), Some(session_id.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_revoke_without_cache_is_noop_success() {
        let authority = authority();
        let pair = authority
            .issue_tokens(&test_user(), IssueOptions::default())
            .await
            .unwrap();

        // Idempotent no-op success, twice
        assert!(authority.revoke_token(&pair.access_token).await.unwrap());
        assert!(authority.revoke_token(&pair.access_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_token_round_trip() {
        let authority = authority();
        let user_id = Uuid::new_v4();

        let token = authority
            .issue_password_reset(user_id, "zhang@suoke.life")
            .await
            .unwrap();

        let claims = authority.verify_password_reset(&token).await.unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "zhang@suoke.life");
        assert_eq!(claims.token_type, "reset");
        assert_eq!(claims.exp - claims.iat, 1800);
    }

    #[tokio::test]
    async fn test_reset_token_rejected_as_access() {
        let authority = authority();
        let token = authority
            .issue_password_reset(Uuid::new_v4(), "u@suoke.life")
            .await
            .unwrap();

        assert!(authority.verify_access(&token).await.is_err());
    }
}
