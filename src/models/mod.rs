// Database models for the auth service core

pub mod auth;
pub mod device;
pub mod permission;
pub mod recovery_code;
pub mod session;
pub mod user;
pub mod user_event;

pub use auth::{AccessTokenClaims, RefreshTokenClaims, ResetTokenClaims};
pub use device::{Device, DeviceError, NewDevice};
pub use recovery_code::{NewRecoveryCode, RecoveryCode, RecoveryCodeError};
pub use session::{NewSession, Session, SessionError, SessionStatus, SessionUpdate};
pub use user::{NewUser, TwoFactorMethod, User, UserError, UserPublic, UserStatus, UserUpdate};
pub use user_event::{NewUserEvent, UserEvent, UserEventError};
