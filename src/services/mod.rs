// Services module for the auth core
// Business logic layer of the application

pub mod auth;
pub mod background_tasks;
pub mod device;
pub mod permission;
pub mod risk;
pub mod security_log;
pub mod session;
pub mod sms_code;
pub mod token;
pub mod transports;
pub mod two_factor;

// Re-export commonly used services
pub use auth::{AuthOrchestrator, LoginOutcome, LoginSuccess, LogoutSummary, RegisterInput, RequestContext};
pub use background_tasks::initialize_background_tasks;
pub use device::{DeviceRegistry, DeviceRegistryError};
pub use permission::{PermissionError, PermissionResolver};
pub use risk::{LoginSecurityOutcome, RiskEngine, RiskEngineError, VerificationInfo};
pub use security_log::{SecurityEvent, SecurityEventType, SecurityLogService};
pub use session::{CreateSession, SessionManager, SessionManagerError};
pub use sms_code::{SmsCodeError, SmsCodeService};
pub use token::{
    IssueOptions, RevocableClaims, TokenAuthority, TokenConfig, TokenError, TokenPair,
};
pub use transports::{
    EmailTransport, GeoLocation, GeoLookup, LoggingEmailTransport, LoggingNotificationDispatch,
    LoggingSmsTransport, NoopGeoLookup, NotificationDispatch, SmsTransport, SuspiciousLoginNotice,
    TransportError,
};
pub use two_factor::{ProvisionedSetup, TwoFactorError, TwoFactorOutcome, TwoFactorService};
