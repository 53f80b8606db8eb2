// Application state and service registry. Constructed once at startup;
// every service receives its dependencies explicitly.

use std::sync::Arc;

use crate::{
    app_config::AppConfig,
    db::DieselPool,
    services::{
        AuthOrchestrator, DeviceRegistry, PermissionResolver, RiskEngine, SecurityLogService,
        SessionManager, SmsCodeService, TokenAuthority, TwoFactorService,
    },
    RedisPool,
};

// Application state shared across request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub diesel_pool: DieselPool,
    pub redis_pool: RedisPool,
    pub security_log: Arc<SecurityLogService>,
    pub token_authority: Arc<TokenAuthority>,
    pub session_manager: Arc<SessionManager>,
    pub device_registry: Arc<DeviceRegistry>,
    pub risk_engine: Arc<RiskEngine>,
    pub two_factor_service: Arc<TwoFactorService>,
    pub sms_code_service: Arc<SmsCodeService>,
    pub auth_orchestrator: Arc<AuthOrchestrator>,
    pub permission_resolver: Arc<PermissionResolver>,
    pub max_connections: u32,
}
