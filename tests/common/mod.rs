//! Shared helpers for router-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
};
use trailboard::{
    ServerConfig,
    auth::{RefreshTokenStore, StoreError, hash_password},
    create_app,
    db::{Database, NewUser, Role},
    jwt::{JwtConfig, JwtSettings},
};

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-with-enough-length!!";

pub fn jwt_settings() -> JwtSettings {
    JwtSettings::new(TEST_SECRET.to_vec())
}

pub fn jwt() -> JwtConfig {
    JwtConfig::new(&jwt_settings()).expect("valid test settings")
}

pub async fn open_db() -> Database {
    Database::open(":memory:")
        .await
        .expect("Failed to open test database")
}

/// Config with a generous login rate so tests never trip the limiter.
pub fn test_config(db: &Database) -> ServerConfig {
    let mut config = ServerConfig::new(db.clone(), jwt_settings());
    config.login_attempts_per_minute = 1000;
    config
}

/// Create a test app and return (app, db, jwt_config).
pub async fn create_test_app() -> (axum::Router, Database, JwtConfig) {
    let db = open_db().await;
    let app = create_app(&test_config(&db)).expect("valid config");
    (app, db, jwt())
}

pub async fn create_user(db: &Database, username: &str, password: &str, role: Role) -> i64 {
    let hash = hash_password(password).unwrap();
    db.users()
        .create(NewUser {
            username,
            password_hash: &hash,
            role,
            provider: None,
        })
        .await
        .unwrap()
}

/// Refresh store that behaves like an unreachable backend.
pub struct UnreachableStore;

#[async_trait]
impl RefreshTokenStore for UnreachableStore {
    async fn save(&self, _subject: &str, _token: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn find_by_subject(&self, _subject: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _subject: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

pub fn unreachable_store() -> Arc<dyn RefreshTokenStore> {
    Arc::new(UnreachableStore)
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of the named cookie in a list of Set-Cookie headers, if set (not cleared).
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let rest = c.strip_prefix(&format!("{}=", name))?;
        if c.contains("Max-Age=0") {
            return None;
        }
        rest.split(';').next().map(|v| v.to_string())
    })
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=", cookie_name)) && c.contains("Max-Age=0"))
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
