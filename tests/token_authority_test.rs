// Token authority tests without cache dependencies
// Issue/verify round trips, type discrimination and claim layout

use chrono::Utc;
use uuid::Uuid;

use suoke_auth_core::app_config::JwtSettings;
use suoke_auth_core::models::User;
use suoke_auth_core::services::IssueOptions;
use suoke_auth_core::{TokenAuthority, TokenConfig, TokenError};

fn test_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-test-secret-at-least-32-chars".to_string(),
        access_expiry: 86400,
        refresh_expiry: 604800,
        reset_expiry: 1800,
        audience: "https://suoke.life".to_string(),
        issuer: "suoke-auth-service".to_string(),
    }
}

fn test_user(role: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        username: "li_na".to_string(),
        email: Some("li.na@suoke.life".to_string()),
        phone: Some("+8613912345678".to_string()),
        password_hash: "$2b$10$hash".to_string(),
        status: "active".to_string(),
        role: role.to_string(),
        secondary_roles: None,
        two_factor_enabled: false,
        two_factor_secret: None,
        two_factor_method: None,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_issued_pair_verifies_with_matching_claims() {
    let authority = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));
    let user = test_user("knowledge_editor");
    let session_id = Uuid::new_v4();
    let device_id = Uuid::new_v4();

    let pair = authority
        .issue_tokens(
            &user,
            IssueOptions {
                session_id: Some(session_id),
                device_id: Some(device_id),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to issue tokens");

    let access = authority
        .verify_access(&pair.access_token)
        .await
        .expect("Failed to verify access token");
    assert_eq!(access.sub, user.id.to_string());
    assert_eq!(access.role, "knowledge_editor");
    assert_eq!(access.iss, "suoke-auth-service");
    assert_eq!(access.aud, "https://suoke.life");
    assert_eq!(access.sid.as_deref(), Some(session_id.to_string().as_str()));
    assert_eq!(access.did.as_deref(), Some(device_id.to_string().as_str()));

    let refresh = authority
        .verify_refresh(&pair.refresh_token)
        .await
        .expect("Failed to verify refresh token");
    assert_eq!(refresh.sub, access.sub);
    assert_eq!(refresh.sid, access.sid);
    assert_ne!(pair.jti, pair.refresh_jti, "each token gets a unique jti");
}

#[tokio::test]
async fn test_jtis_are_globally_unique_across_issues() {
    let authority = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));
    let user = test_user("user");

    let mut seen = std::collections::HashSet::new();
    for _ in 0..20 {
        let pair = authority
            .issue_tokens(&user, IssueOptions::default())
            .await
            .unwrap();
        assert!(seen.insert(pair.jti.clone()));
        assert!(seen.insert(pair.refresh_jti.clone()));
    }
}

#[tokio::test]
async fn test_type_confusion_is_rejected() {
    let authority = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));
    let pair = authority
        .issue_tokens(&test_user("user"), IssueOptions::default())
        .await
        .unwrap();

    assert!(matches!(
        authority.verify_access(&pair.refresh_token).await,
        Err(TokenError::WrongType)
    ));
    assert!(matches!(
        authority.verify_refresh(&pair.access_token).await,
        Err(TokenError::WrongType)
    ));
}

#[tokio::test]
async fn test_custom_ttls_apply() {
    let authority = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));
    let pair = authority
        .issue_tokens(
            &test_user("user"),
            IssueOptions {
                access_ttl: Some(600),
                refresh_ttl: Some(1200),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(pair.expires_in, 600);
    assert_eq!(pair.refresh_expires_in, 1200);

    let claims = authority.verify_access(&pair.access_token).await.unwrap();
    assert_eq!(claims.exp - claims.iat, 600);
}

#[tokio::test]
async fn test_garbage_tokens_are_rejected() {
    let authority = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));

    for garbage in ["", "not-a-jwt", "a.b.c", "ey.ey.ey"] {
        assert!(
            authority.verify_access(garbage).await.is_err(),
            "garbage token {:?} must not verify",
            garbage
        );
    }
}

#[tokio::test]
async fn test_cross_secret_verification_fails() {
    let issuer = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));

    let mut other_settings = test_settings();
    other_settings.secret = "a-completely-different-32-char-secret!!".to_string();
    let verifier = TokenAuthority::new(TokenConfig::from_settings(&other_settings));

    let pair = issuer
        .issue_tokens(&test_user("user"), IssueOptions::default())
        .await
        .unwrap();

    assert!(verifier.verify_access(&pair.access_token).await.is_err());
}

#[tokio::test]
async fn test_password_reset_token_lifecycle() {
    let authority = TokenAuthority::new(TokenConfig::from_settings(&test_settings()));
    let user_id = Uuid::new_v4();

    let token = authority
        .issue_password_reset(user_id, "li.na@suoke.life")
        .await
        .unwrap();

    let claims = authority.verify_password_reset(&token).await.unwrap();
    assert_eq!(claims.sub, user_id.to_string());
    assert_eq!(claims.exp - claims.iat, 1800);

    // A reset token is not a bearer credential
    assert!(authority.verify_access(&token).await.is_err());
    assert!(authority.verify_refresh(&token).await.is_err());
}
