//! Password login, registration and logout.
//!
//! - GET/POST `/auth/login`
//! - GET/POST `/auth/register`
//! - any `/auth/logout`

use axum::{
    Form, Router,
    extract::{Query, State},
    http::header::SET_COOKIE,
    middleware,
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    routing::{any, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::{
    ACCESS_COOKIE_NAME, CookieSettings, LOGIN_PATH, LoginBridge, MaybeAuthenticated,
    REFRESH_COOKIE_NAME, hash_password,
};
use crate::db::{NewUser, Role, UserStore};
use crate::oauth2::is_provider_username;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

const REGISTER_PATH: &str = "/auth/register";
const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Clone)]
pub struct AuthState {
    pub bridge: Arc<LoginBridge>,
    pub users: UserStore,
    pub cookies: CookieSettings,
    /// Provider names offered on the login page
    pub oauth2_providers: Vec<String>,
}

pub fn router(state: AuthState, rate_limit: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route(
            LOGIN_PATH,
            post(login)
                .layer(middleware::from_fn_with_state(
                    rate_limit.clone(),
                    rate_limit_login,
                ))
                .get(login_page),
        )
        .route(
            REGISTER_PATH,
            post(register)
                .layer(middleware::from_fn_with_state(rate_limit, rate_limit_register))
                .get(register_page),
        )
        .route("/auth/logout", any(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct ErrorQuery {
    error: Option<String>,
}

fn error_message(code: Option<&str>) -> Option<&'static str> {
    match code? {
        "bad_credentials" => Some("Invalid username or password."),
        "oauth_failed" => Some("Third-party login failed."),
        "invalid_username" => Some("Usernames use letters, digits and underscores (max 50)."),
        "invalid_password" => Some("Passwords must be 8 to 128 characters."),
        "username_taken" => Some("That username is already taken."),
        "username_reserved" => Some("That username is reserved for third-party accounts."),
        "server_error" => Some("Something went wrong. Please try again."),
        _ => None,
    }
}

fn render_form(title: &str, action: &str, error: Option<&str>, footer: &str) -> Html<String> {
    let error = error_message(error)
        .map(|m| format!("<p class=\"error\">{}</p>", m))
        .unwrap_or_default();
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head><body>\
         <h1>{title}</h1>{error}\
         <form method=\"post\" action=\"{action}\">\
         <input name=\"username\" placeholder=\"Username\" required>\
         <input name=\"password\" type=\"password\" placeholder=\"Password\" required>\
         <button type=\"submit\">{title}</button></form>{footer}</body></html>"
    ))
}

async fn login_page(
    State(state): State<AuthState>,
    MaybeAuthenticated(ctx): MaybeAuthenticated,
    Query(query): Query<ErrorQuery>,
) -> Response {
    if ctx.is_some() {
        return Redirect::to("/").into_response();
    }
    let mut footer = String::from("<p><a href=\"/auth/register\">Register</a></p>");
    for provider in &state.oauth2_providers {
        footer.push_str(&format!(
            "<p><a href=\"/oauth2/authorization/{0}\">Sign in with {0}</a></p>",
            provider
        ));
    }
    render_form("Login", LOGIN_PATH, query.error.as_deref(), &footer).into_response()
}

#[derive(Deserialize)]
struct CredentialsForm {
    username: String,
    password: String,
}

async fn login(State(state): State<AuthState>, Form(form): Form<CredentialsForm>) -> Response {
    match state
        .bridge
        .password_login(form.username.trim(), &form.password)
        .await
    {
        Ok(cookies) => cookies.redirect("/"),
        Err(e) => {
            state.bridge.log_failure("password", &e);
            Redirect::to(&format!("{}?error=bad_credentials", LOGIN_PATH)).into_response()
        }
    }
}

async fn register_page(Query(query): Query<ErrorQuery>) -> Html<String> {
    render_form(
        "Register",
        REGISTER_PATH,
        query.error.as_deref(),
        "<p><a href=\"/auth/login\">Login</a></p>",
    )
}

/// Why a registration form was rejected.
fn validate_registration(
    username: &str,
    password: &str,
    providers: &[String],
) -> Result<(), &'static str> {
    if username.is_empty()
        || username.len() > MAX_USERNAME_LENGTH
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err("invalid_username");
    }
    if is_provider_username(username, providers) {
        return Err("username_reserved");
    }

    let password_len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password_len) {
        return Err("invalid_password");
    }

    Ok(())
}

async fn register(State(state): State<AuthState>, Form(form): Form<CredentialsForm>) -> Redirect {
    let fail = |code: &str| Redirect::to(&format!("{}?error={}", REGISTER_PATH, code));
    let username = form.username.trim();

    if let Err(code) = validate_registration(username, &form.password, &state.oauth2_providers) {
        return fail(code);
    }

    match state.users.is_username_available(username).await {
        Ok(true) => {}
        Ok(false) => return fail("username_taken"),
        Err(e) => {
            error!(error = %e, "Failed to check username availability");
            return fail("server_error");
        }
    }

    let password = form.password;
    let hash = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to hash password");
            return fail("server_error");
        }
        Err(e) => {
            error!(error = %e, "Password hashing task failed");
            return fail("server_error");
        }
    };

    let created = state
        .users
        .create(NewUser {
            username,
            password_hash: &hash,
            role: Role::User,
            provider: None,
        })
        .await;

    match created {
        Ok(_) => {
            info!(username = %username, "Registered user");
            Redirect::to(LOGIN_PATH)
        }
        // Unique constraint: a concurrent registration won
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => fail("username_taken"),
        Err(e) => {
            error!(error = %e, "Failed to create user");
            fail("server_error")
        }
    }
}

/// Clear both cookies, then delete the refresh session. The store delete is
/// best-effort: the client is logged out even if the store is unreachable.
async fn logout(
    State(state): State<AuthState>,
    MaybeAuthenticated(ctx): MaybeAuthenticated,
) -> impl IntoResponse {
    if let Some(ctx) = ctx {
        state.bridge.revoke(&ctx.subject).await;
        info!(subject = %ctx.subject, "Logged out");
    }

    (
        AppendHeaders([
            (SET_COOKIE, state.cookies.clear(ACCESS_COOKIE_NAME)),
            (SET_COOKIE, state.cookies.clear(REFRESH_COOKIE_NAME)),
        ]),
        Redirect::to("/"),
    )
}
