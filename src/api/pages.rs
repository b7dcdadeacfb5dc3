//! Pages and the identity endpoint.
//!
//! Access to each route is decided by the rule table before the handler runs.

use axum::{
    Json, Router,
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Serialize;

use super::error::{ApiError, ResultExt};
use crate::auth::{Authenticated, MaybeAuthenticated};
use crate::db::UserStore;

#[derive(Clone)]
pub struct PagesState {
    pub users: UserStore,
}

pub fn router(state: PagesState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/my-page", get(my_page))
        .route("/admin", get(admin))
        .route("/api/me", get(me))
        .with_state(state)
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head>\
         <body><h1>{title}</h1>{body}</body></html>"
    ))
}

async fn index(MaybeAuthenticated(ctx): MaybeAuthenticated) -> Html<String> {
    let body = match ctx {
        Some(ctx) => format!(
            "<p>Signed in as {}</p><p><a href=\"/auth/logout\">Logout</a></p>",
            ctx.subject
        ),
        None => "<p><a href=\"/auth/login\">Login</a></p>".to_string(),
    };
    page("Trailboard", &body)
}

async fn my_page(Authenticated(ctx): Authenticated) -> Html<String> {
    page(
        "My page",
        &format!("<p>{} ({})</p>", ctx.subject, ctx.role.name()),
    )
}

async fn admin(Authenticated(ctx): Authenticated) -> Html<String> {
    page("Admin", &format!("<p>Administrator: {}</p>", ctx.subject))
}

#[derive(Serialize)]
struct MeResponse {
    username: String,
    role: String,
    /// Third-party provider for accounts created through OAuth2
    provider: Option<String>,
}

/// The current identity. The role is the one carried by the token.
async fn me(
    State(state): State<PagesState>,
    Authenticated(ctx): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .get_by_username(&ctx.subject)
        .await
        .db_err("Failed to load account")?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    Ok(Json(MeResponse {
        username: ctx.subject,
        role: ctx.role.as_str().to_string(),
        provider: user.provider,
    }))
}
