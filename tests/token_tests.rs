//! Tests for the credential filter chain through the router.
//!
//! Tests cover:
//! - Valid access token authenticates without a reissue
//! - Expired access token + matching refresh token reissues an access token
//! - Refresh tokens that do not match the store record are rejected
//! - Token kind confusion is rejected in both directions
//! - Store failures during refresh degrade to unauthenticated

mod common;

use axum::http::StatusCode;
use common::*;
use tower::ServiceExt;
use trailboard::{
    create_app,
    db::Role,
    jwt::{ACCESS_TOKEN_DURATION_SECS, JwtConfig, TokenKind, now_secs},
};

fn expired_access(jwt: &JwtConfig, subject: &str, role: Role) -> String {
    // Expired one second ago
    let issued = now_secs().unwrap() - ACCESS_TOKEN_DURATION_SECS - 1;
    jwt.issue_at(subject, role, TokenKind::Access, issued)
        .unwrap()
        .token
}

#[tokio::test]
async fn test_valid_access_token_authenticates() {
    let (app, _, jwt) = create_test_app().await;
    let access = jwt.issue("alice", Role::User, TokenKind::Access).unwrap();

    let response = app
        .oneshot(get("/api/me", Some(&format!("access_token={}", access.token))))
        .await
        .unwrap();

    // Account lookup fails (no row), but the request got past authorization
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(extract_set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_me_returns_identity() {
    let (app, db, jwt) = create_test_app().await;
    create_user(&db, "alice", "password1", Role::User).await;
    let access = jwt.issue("alice", Role::User, TokenKind::Access).unwrap();

    let response = app
        .oneshot(get("/api/me", Some(&format!("access_token={}", access.token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "ROLE_USER");
}

#[tokio::test]
async fn test_expired_access_with_matching_refresh_reissues() {
    let (app, db, jwt) = create_test_app().await;
    create_user(&db, "alice", "password1", Role::User).await;
    let refresh = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &refresh.token).await.unwrap();

    let cookie = format!(
        "access_token={}; refresh_token={}",
        expired_access(&jwt, "alice", Role::User),
        refresh.token
    );
    let response = app.oneshot(get("/api/me", Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].contains("Max-Age=3600"));

    let access = cookie_value(&cookies, "access_token").unwrap();
    let claims = jwt.validate_access(&access).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.role, Role::User);

    // No rotation: the store still holds the same refresh token
    let stored = db.refresh_sessions(60).get("alice").await.unwrap().unwrap();
    assert_eq!(stored.token, refresh.token);
}

#[tokio::test]
async fn test_missing_access_with_matching_refresh_reissues() {
    let (app, db, jwt) = create_test_app().await;
    let refresh = jwt.issue("alice", Role::Admin, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &refresh.token).await.unwrap();

    let response = app
        .oneshot(get("/admin", Some(&format!("refresh_token={}", refresh.token))))
        .await
        .unwrap();

    // Role comes from the refresh claims
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = extract_set_cookies(&response);
    let access = cookie_value(&cookies, "access_token").unwrap();
    assert_eq!(jwt.validate_access(&access).unwrap().role, Role::Admin);
}

#[tokio::test]
async fn test_unmatched_refresh_redirects_to_login() {
    let (app, db, jwt) = create_test_app().await;
    let stale = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    let current = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &current.token).await.unwrap();

    let cookie = format!(
        "access_token={}; refresh_token={}",
        expired_access(&jwt, "alice", Role::User),
        stale.token
    );
    let response = app.oneshot(get("/my-page", Some(&cookie))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/auth/login"));
    assert!(cookie_value(&extract_set_cookies(&response), "access_token").is_none());
}

#[tokio::test]
async fn test_refresh_after_logout_is_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let refresh = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &refresh.token).await.unwrap();
    db.refresh_sessions(60).delete("alice").await.unwrap();

    let response = app
        .oneshot(get("/my-page", Some(&format!("refresh_token={}", refresh.token))))
        .await
        .unwrap();
    assert_eq!(location(&response), Some("/auth/login"));
}

#[tokio::test]
async fn test_refresh_token_in_access_cookie_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let refresh = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &refresh.token).await.unwrap();

    let response = app
        .oneshot(get("/my-page", Some(&format!("access_token={}", refresh.token))))
        .await
        .unwrap();
    assert_eq!(location(&response), Some("/auth/login"));
}

#[tokio::test]
async fn test_access_token_in_refresh_cookie_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let access = jwt.issue("alice", Role::User, TokenKind::Access).unwrap();
    db.refresh_sessions(60).save("alice", &access.token).await.unwrap();

    let response = app
        .oneshot(get("/my-page", Some(&format!("refresh_token={}", access.token))))
        .await
        .unwrap();
    assert_eq!(location(&response), Some("/auth/login"));
}

#[tokio::test]
async fn test_token_from_other_secret_rejected() {
    let (app, _, _) = create_test_app().await;
    let foreign = JwtConfig::new(&trailboard::jwt::JwtSettings::new(b"another-secret".to_vec()))
        .unwrap()
        .issue("alice", Role::Admin, TokenKind::Access)
        .unwrap();

    let response = app
        .oneshot(get("/admin", Some(&format!("access_token={}", foreign.token))))
        .await
        .unwrap();
    assert_eq!(location(&response), Some("/auth/login"));
}

#[tokio::test]
async fn test_store_failure_during_refresh_is_unauthenticated() {
    let db = open_db().await;
    let mut config = test_config(&db);
    config.token_store = Some(unreachable_store());
    let app = create_app(&config).unwrap();
    let jwt = jwt();
    let refresh = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();

    let response = app
        .clone()
        .oneshot(get("/my-page", Some(&format!("refresh_token={}", refresh.token))))
        .await
        .unwrap();
    assert_eq!(location(&response), Some("/auth/login"));

    // A valid access token never touches the store
    let access = jwt.issue("alice", Role::User, TokenKind::Access).unwrap();
    let response = app
        .oneshot(get("/my-page", Some(&format!("access_token={}", access.token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
