//! Path rules applied to whole requests.

mod common;

use axum::http::{Method, Request, StatusCode};
use common::*;
use tower::ServiceExt;
use trailboard::{db::Role, jwt::TokenKind};

fn access_cookie(role: Role) -> String {
    let access = jwt().issue("alice", role, TokenKind::Access).unwrap();
    format!("access_token={}", access.token)
}

#[tokio::test]
async fn test_index_is_public() {
    let (app, _, _) = create_test_app().await;

    let response = app.clone().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("/auth/login"));

    let response = app
        .oneshot(get("/", Some(&access_cookie(Role::User))))
        .await
        .unwrap();
    assert!(body_string(response).await.contains("Signed in as alice"));
}

#[tokio::test]
async fn test_protected_pages_redirect_anonymous_users() {
    let (app, _, _) = create_test_app().await;

    for path in ["/my-page", "/admin", "/api/me", "/posts/7", "/unknown"] {
        let response = app.clone().oneshot(get(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&response), Some("/auth/login"), "{path}");
    }
}

#[tokio::test]
async fn test_public_paths_reach_routing() {
    let (app, _, _) = create_test_app().await;

    // Permitted but unrouted: 404 rather than a login redirect
    for path in ["/css/site.css", "/posts", "/api/posts/3"] {
        let response = app.clone().oneshot(get(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_method_specific_permit() {
    let (app, _, _) = create_test_app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/posts")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(location(&response), Some("/auth/login"));
}

#[tokio::test]
async fn test_my_page_for_users_and_admins() {
    let (app, _, _) = create_test_app().await;

    for role in [Role::User, Role::Admin] {
        let response = app
            .clone()
            .oneshot(get("/my-page", Some(&access_cookie(role))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_admin_requires_admin_role() {
    let (app, _, _) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(get("/admin", Some(&access_cookie(Role::User))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get("/admin", Some(&access_cookie(Role::Admin))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Administrator: alice"));
}
