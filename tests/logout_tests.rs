mod common;

use axum::http::StatusCode;
use common::*;
use tower::ServiceExt;
use trailboard::{
    create_app,
    db::Role,
    jwt::{ACCESS_TOKEN_DURATION_SECS, TokenKind, now_secs},
};

#[tokio::test]
async fn test_logout_clears_cookies_and_session() {
    let (app, db, jwt) = create_test_app().await;
    let access = jwt.issue("alice", Role::User, TokenKind::Access).unwrap();
    let refresh = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &refresh.token).await.unwrap();

    let cookie = format!("access_token={}; refresh_token={}", access.token, refresh.token);
    let response = app
        .clone()
        .oneshot(get("/auth/logout", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
    assert!(db.refresh_sessions(60).get("alice").await.unwrap().is_none());

    // The old refresh token no longer mints access tokens
    let response = app
        .oneshot(get("/my-page", Some(&format!("refresh_token={}", refresh.token))))
        .await
        .unwrap();
    assert_eq!(location(&response), Some("/auth/login"));
}

#[tokio::test]
async fn test_logout_accepts_post() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .oneshot(post_form("/auth/logout", "", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
}

#[tokio::test]
async fn test_logout_with_unreachable_store_still_clears_cookies() {
    let db = open_db().await;
    let mut config = test_config(&db);
    config.token_store = Some(unreachable_store());
    let app = create_app(&config).unwrap();
    let jwt = jwt();
    let access = jwt.issue("alice", Role::User, TokenKind::Access).unwrap();

    let response = app
        .oneshot(get(
            "/auth/logout",
            Some(&format!("access_token={}", access.token)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));
    let cookies = extract_set_cookies(&response);
    assert!(has_cleared_cookie(&cookies, "access_token"));
    assert!(has_cleared_cookie(&cookies, "refresh_token"));
}

#[tokio::test]
async fn test_logout_is_not_undone_by_reissue() {
    let (app, db, jwt) = create_test_app().await;
    let refresh = jwt.issue("alice", Role::User, TokenKind::Refresh).unwrap();
    db.refresh_sessions(60).save("alice", &refresh.token).await.unwrap();
    let expired = jwt
        .issue_at(
            "alice",
            Role::User,
            TokenKind::Access,
            now_secs().unwrap() - ACCESS_TOKEN_DURATION_SECS - 1,
        )
        .unwrap();

    let cookie = format!("access_token={}; refresh_token={}", expired.token, refresh.token);
    let response = app.oneshot(get("/auth/logout", Some(&cookie))).await.unwrap();

    let cookies = extract_set_cookies(&response);
    assert!(cookie_value(&cookies, "access_token").is_none());
    assert!(has_cleared_cookie(&cookies, "access_token"));
    // The refresh filter identified alice, so her session is gone too
    assert!(db.refresh_sessions(60).get("alice").await.unwrap().is_none());
}
