// Device fingerprinting and user-agent normalization.
// The fingerprint is a SHA-256 over a pipe-joined canonical record and is
// deterministic and re-derivable from the same normalized inputs.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use woothee::parser::Parser;

lazy_static! {
    static ref TABLET_RE: Regex = Regex::new(r"(?i)ipad|tablet|kindle|silk").unwrap();
    static ref MOBILE_RE: Regex = Regex::new(r"(?i)mobile|iphone|android").unwrap();
}

/// Client-reported device attributes. Every field is optional; normalization
/// fills what it can from the user agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub user_agent: Option<String>,
    pub client_id: Option<String>,
    pub app_version: Option<String>,
}

impl DeviceInfo {
    pub fn from_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            ..Default::default()
        }
    }
}

/// Classify a user agent as mobile/tablet/desktop.
pub fn device_type_from_user_agent(user_agent: &str) -> String {
    if TABLET_RE.is_match(user_agent) {
        return "tablet".to_string();
    }
    if MOBILE_RE.is_match(user_agent) {
        return "mobile".to_string();
    }
    match Parser::new().parse(user_agent) {
        Some(result) => match result.category {
            "smartphone" | "mobilephone" => "mobile".to_string(),
            "pc" => "desktop".to_string(),
            _ => "unknown".to_string(),
        },
        None => "unknown".to_string(),
    }
}

/// Fill missing device attributes from the user agent. Fields already
/// present are left untouched, which makes normalization idempotent.
/// Values the parser cannot determine become "unknown".
pub fn normalize_device(info: &DeviceInfo) -> DeviceInfo {
    let mut normalized = info.clone();
    let ua = info.user_agent.as_deref().unwrap_or("");

    let parsed = if ua.is_empty() {
        None
    } else {
        Parser::new().parse(ua)
    };

    if normalized.device_type.is_none() {
        normalized.device_type = Some(if ua.is_empty() {
            "unknown".to_string()
        } else {
            device_type_from_user_agent(ua)
        });
    }

    let unknown_or = |value: Option<&str>| -> String {
        match value {
            Some(v) if !v.is_empty() && v != "UNKNOWN" => v.to_string(),
            _ => "unknown".to_string(),
        }
    };

    if normalized.os_name.is_none() {
        normalized.os_name = Some(unknown_or(parsed.as_ref().map(|p| p.os)));
    }
    if normalized.os_version.is_none() {
        normalized.os_version = Some(unknown_or(parsed.as_ref().map(|p| p.os_version.as_ref())));
    }
    if normalized.browser_name.is_none() {
        normalized.browser_name = Some(unknown_or(parsed.as_ref().map(|p| p.name)));
    }
    if normalized.browser_version.is_none() {
        normalized.browser_version = Some(unknown_or(parsed.as_ref().map(|p| p.version)));
    }

    normalized
}

/// Canonical pipe-joined record. Missing fields are empty strings.
fn canonical_string(info: &DeviceInfo) -> String {
    [
        info.device_type.as_deref().unwrap_or(""),
        info.os_name.as_deref().unwrap_or(""),
        info.os_version.as_deref().unwrap_or(""),
        info.browser_name.as_deref().unwrap_or(""),
        info.browser_version.as_deref().unwrap_or(""),
        info.user_agent.as_deref().unwrap_or(""),
        info.client_id.as_deref().unwrap_or(""),
        info.app_version.as_deref().unwrap_or(""),
    ]
    .join("|")
}

/// Compute the 64-hex-character device fingerprint.
pub fn fingerprint(info: &DeviceInfo) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(info).as_bytes());
    format!("{:x}", hasher.finalize())
}
