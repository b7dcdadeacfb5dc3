//! Third-party login endpoints.
//!
//! - GET `/oauth2/authorization/{provider}` - Redirect to the provider
//! - GET `/login/oauth2/code/{provider}` - Provider callback

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use crate::auth::{CookieSettings, LOGIN_PATH, LoginBridge, get_cookie};
use crate::oauth2::{
    IdentityResolver, OAuth2Providers, STATE_COOKIE_NAME, STATE_COOKIE_PATH, STATE_MAX_AGE_SECS,
};

#[derive(Clone)]
pub struct OAuth2State {
    pub providers: Arc<OAuth2Providers>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub bridge: Arc<LoginBridge>,
    pub cookies: CookieSettings,
}

pub fn router(state: OAuth2State) -> Router {
    Router::new()
        .route("/oauth2/authorization/{provider}", get(authorize))
        .route("/login/oauth2/code/{provider}", get(callback))
        .with_state(state)
}

/// Random, URL-safe anti-forgery value.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn authorize(
    State(state): State<OAuth2State>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let config = state
        .providers
        .get(&provider)
        .ok_or_else(|| ApiError::not_found("Unknown login provider"))?;

    let csrf = generate_state();
    let url = config
        .authorization_url(&csrf)
        .map_err(|e| ApiError::internal(format!("Invalid authorize URL: {}", e)))?;

    let cookie = state.cookies.set_with_path(
        STATE_COOKIE_NAME,
        &csrf,
        STATE_COOKIE_PATH,
        STATE_MAX_AGE_SECS,
    );

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::to(url.as_str()),
    )
        .into_response())
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Verify the round trip, resolve the identity, and hand it to the bridge.
/// Every failure lands on the login page with `error=oauth_failed`.
async fn callback(
    State(state): State<OAuth2State>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let clear_state = state
        .cookies
        .clear_with_path(STATE_COOKIE_NAME, STATE_COOKIE_PATH);

    let mut response = match complete_login(&state, &provider, &query, &headers).await {
        Ok(response) => response,
        Err(reason) => {
            warn!(provider = %provider, reason = %reason, "OAuth2 login failed");
            Redirect::to(&format!("{}?error=oauth_failed", LOGIN_PATH)).into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&clear_state) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

async fn complete_login(
    state: &OAuth2State,
    provider: &str,
    query: &CallbackQuery,
    headers: &HeaderMap,
) -> Result<Response, String> {
    if let Some(error) = &query.error {
        return Err(format!("provider returned error: {}", error));
    }

    let expected = get_cookie(headers, STATE_COOKIE_NAME).ok_or("missing state cookie")?;
    match query.state.as_deref() {
        Some(received) if !expected.is_empty() && received == expected => {}
        _ => return Err("state mismatch".to_string()),
    }

    let code = query.code.as_deref().ok_or("missing authorization code")?;

    let user = state
        .resolver
        .resolve(provider, code)
        .await
        .map_err(|e| e.to_string())?;

    match state.bridge.oauth2_login(&user).await {
        Ok(cookies) => Ok(cookies.redirect("/")),
        Err(e) => {
            state.bridge.log_failure("oauth2", &e);
            Err(e.to_string())
        }
    }
}
