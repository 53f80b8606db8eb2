// Library exports for the suoke auth service core.
// Exposes the service registry and subsystems for embedding consumers.

pub mod app;
pub mod app_config;
pub mod config;
pub mod db;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use db::{DieselPool, RedisConfig, RedisPool};
pub use models::auth::{AccessTokenClaims, RefreshTokenClaims, ResetTokenClaims};
pub use models::{Device, Session, SessionStatus, User, UserPublic, UserStatus};
pub use services::{
    AuthOrchestrator, DeviceRegistry, LoginOutcome, PermissionResolver, RiskEngine,
    SecurityEventType, SecurityLogService, SessionManager, SmsCodeService, TokenAuthority,
    TokenConfig, TokenError, TokenPair, TwoFactorService,
};
pub use utils::{AuthError, FailureReason};

use std::sync::Arc;
use tracing::info;

use crate::services::{
    LoggingEmailTransport, LoggingNotificationDispatch, LoggingSmsTransport, NoopGeoLookup,
    TokenAuthority as Tokens,
};

/// Initialize pools and the full service registry from the environment.
/// Collaborator transports default to the logging implementations; embedders
/// with real delivery adapters should construct the registry themselves.
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // Load environment
    dotenv::dotenv().ok();

    let config = app_config::config();

    info!("Initializing database pool...");
    let db_config = db::DieselDatabaseConfig::default();
    let max_connections = db_config.max_connections;
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    info!("Initializing Redis pool...");
    let redis_config = RedisConfig::from_env();
    let redis_pool = RedisPool::new(redis_config).await?;

    // Collaborator contracts: development implementations
    let email = Arc::new(LoggingEmailTransport);
    let sms = Arc::new(LoggingSmsTransport);
    let geo = Arc::new(NoopGeoLookup);
    let notifier = Arc::new(LoggingNotificationDispatch);

    let security_log = SecurityLogService::new(redis_pool.clone(), config.retention.clone());

    let token_authority = Arc::new(Tokens::with_cache(
        TokenConfig::from_settings(&config.jwt),
        redis_pool.clone(),
        security_log.clone(),
    ));

    let session_manager = Arc::new(SessionManager::new(
        diesel_pool.clone(),
        redis_pool.clone(),
        config.session.clone(),
        geo.clone(),
        notifier,
        security_log.clone(),
    ));

    let device_registry = Arc::new(DeviceRegistry::new(diesel_pool.clone()));

    let risk_engine = Arc::new(RiskEngine::new(
        diesel_pool.clone(),
        device_registry.clone(),
        geo,
        security_log.clone(),
        config.security.require_device_verification,
    ));

    let two_factor_service = Arc::new(TwoFactorService::new(
        diesel_pool.clone(),
        redis_pool.clone(),
        security_log.clone(),
        config.app_name.clone(),
        config.security.bcrypt_cost,
    ));

    let sms_code_service = Arc::new(SmsCodeService::new(
        redis_pool.clone(),
        sms,
        config.security.device_verification_code_ttl,
        config.security.sms_code_max_attempts,
        config.security.sms_resend_cooldown,
    ));

    let auth_orchestrator = Arc::new(AuthOrchestrator::new(
        diesel_pool.clone(),
        token_authority.clone(),
        session_manager.clone(),
        device_registry.clone(),
        risk_engine.clone(),
        two_factor_service.clone(),
        sms_code_service.clone(),
        security_log.clone(),
        email,
        config.session.clone(),
        config.security.bcrypt_cost,
    ));

    let permission_resolver = Arc::new(PermissionResolver::new(
        diesel_pool.clone(),
        redis_pool.clone(),
        security_log.clone(),
    ));

    Ok(AppState {
        config: Arc::new(config.clone()),
        diesel_pool,
        redis_pool,
        security_log: Arc::new(security_log),
        token_authority,
        session_manager,
        device_registry,
        risk_engine,
        two_factor_service,
        sms_code_service,
        auth_orchestrator,
        permission_resolver,
        max_connections,
    })
}

/// Aggregate health report across both stores
pub async fn health_check(state: &AppState) -> serde_json::Value {
    let timestamp = chrono::Utc::now().to_rfc3339();
    let mut overall_healthy = true;

    let postgres_health = match db::check_diesel_health(&state.diesel_pool).await {
        Ok(_) => serde_json::json!({
            "status": "healthy",
            "max_connections": state.max_connections,
            "error": null
        }),
        Err(e) => {
            overall_healthy = false;
            serde_json::json!({
                "status": "unhealthy",
                "error": format!("Database connection failed: {}", e)
            })
        }
    };

    let redis_health = state.redis_pool.health_check().await;
    if !redis_health.is_healthy {
        overall_healthy = false;
    }

    serde_json::json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": state.config.app_name,
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres_health,
            "redis": {
                "status": if redis_health.is_healthy { "healthy" } else { "unhealthy" },
                "latency_ms": redis_health.latency_ms,
                "error": redis_health.error
            }
        }
    })
}
