// Verification code service backed by the key-value cache. Used for
// device-verification during login. Codes are rate limited per phone with a
// resend throttle and a hard attempt cap that evicts the code.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::RedisPool;
use crate::services::transports::SmsTransport;

#[derive(Error, Debug)]
pub enum SmsCodeError {
    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification code expired")]
    CodeExpired,

    #[error("Too many attempts")]
    TooManyAttempts,

    #[error("Resend throttled, retry after {retry_after_seconds}s")]
    Throttled { retry_after_seconds: u64 },

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Redis error: {0}")]
    Redis(String),
}

/// Verification code blob stored at sms:code:{phone}
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredCode {
    pub code: String,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct SmsCodeService {
    redis_pool: RedisPool,
    transport: Arc<dyn SmsTransport>,
    code_ttl: u64,
    max_attempts: u32,
    resend_cooldown: u64,
}

impl SmsCodeService {
    pub fn new(
        redis_pool: RedisPool,
        transport: Arc<dyn SmsTransport>,
        code_ttl: u64,
        max_attempts: u32,
        resend_cooldown: u64,
    ) -> Self {
        Self {
            redis_pool,
            transport,
            code_ttl,
            max_attempts,
            resend_cooldown,
        }
    }

    fn code_key(phone: &str) -> String {
        format!("sms:code:{}", phone)
    }

    fn attempts_key(phone: &str) -> String {
        format!("sms:attempts:{}", phone)
    }

    fn throttle_key(phone: &str) -> String {
        format!("sms:throttle:{}", phone)
    }

    fn generate_code() -> String {
        format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
    }

    /// Generate, store and deliver a verification code. A throttle key
    /// blocks resends inside the cooldown window.
    #[instrument(skip(self))]
    pub async fn send_code(&self, phone: &str) -> Result<(), SmsCodeError> {
        let throttle_key = Self::throttle_key(phone);
        if self
            .redis_pool
            .exists(&throttle_key)
            .await
            .map_err(|e| SmsCodeError::Redis(e.to_string()))?
        {
            let remaining = self
                .redis_pool
                .ttl(&throttle_key)
                .await
                .map_err(|e| SmsCodeError::Redis(e.to_string()))?;
            return Err(SmsCodeError::Throttled {
                retry_after_seconds: remaining.max(1) as u64,
            });
        }

        let code = Self::generate_code();
        let stored = StoredCode {
            code: code.clone(),
            created_at: Utc::now().timestamp(),
        };
        let serialized =
            serde_json::to_string(&stored).map_err(|e| SmsCodeError::Redis(e.to_string()))?;

        self.redis_pool
            .set_with_expiry(&Self::code_key(phone), serialized, self.code_ttl)
            .await
            .map_err(|e| SmsCodeError::Redis(e.to_string()))?;

        // Fresh code resets the attempt counter
        self.redis_pool
            .del(&Self::attempts_key(phone))
            .await
            .map_err(|e| SmsCodeError::Redis(e.to_string()))?;

        self.redis_pool
            .set_with_expiry(&throttle_key, "1".to_string(), self.resend_cooldown)
            .await
            .map_err(|e| SmsCodeError::Redis(e.to_string()))?;

        self.transport
            .send_verification_code(phone, &code)
            .await
            .map_err(|e| SmsCodeError::Delivery(e.to_string()))?;

        info!("Sent verification code to {}", phone);
        Ok(())
    }

    /// Verify a code. Every wrong attempt increments the counter; once the
    /// cap is exceeded the stored code is evicted and the caller is rate
    /// limited.
    #[instrument(skip(self, provided_code))]
    pub async fn verify_code(&self, phone: &str, provided_code: &str) -> Result<(), SmsCodeError> {
        let code_key = Self::code_key(phone);

        let stored: StoredCode = match self
            .redis_pool
            .get_string(&code_key)
            .await
            .map_err(|e| SmsCodeError::Redis(e.to_string()))?
        {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| SmsCodeError::Redis(e.to_string()))?
            }
            None => return Err(SmsCodeError::CodeExpired),
        };

        let attempts = self
            .redis_pool
            .incr_with_expiry(&Self::attempts_key(phone), self.code_ttl)
            .await
            .map_err(|e| SmsCodeError::Redis(e.to_string()))?;

        if attempts > self.max_attempts as i64 {
            warn!("Too many verification attempts for {}", phone);
            self.redis_pool.del(&code_key).await.ok();
            self.redis_pool.del(&Self::attempts_key(phone)).await.ok();
            return Err(SmsCodeError::TooManyAttempts);
        }

        if stored.code != provided_code {
            return Err(SmsCodeError::InvalidCode);
        }

        // Success consumes the code
        self.redis_pool.del(&code_key).await.ok();
        self.redis_pool.del(&Self::attempts_key(phone)).await.ok();

        info!("Verification code accepted for {}", phone);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..50 {
            let code = SmsCodeService::generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            SmsCodeService::code_key("+8613912345678"),
            "sms:code:+8613912345678"
        );
        assert_eq!(
            SmsCodeService::attempts_key("+8613912345678"),
            "sms:attempts:+8613912345678"
        );
        assert_eq!(
            SmsCodeService::throttle_key("+8613912345678"),
            "sms:throttle:+8613912345678"
        );
    }
}
