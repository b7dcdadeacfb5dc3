mod auth;
mod error;
mod oauth2;
mod pages;

use axum::Router;
use std::sync::Arc;

use crate::auth::{CookieSettings, LoginBridge};
use crate::db::Database;
use crate::oauth2::{IdentityResolver, OAuth2Providers};
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthState;
pub use error::{ApiError, ResultExt};
pub use oauth2::OAuth2State;
pub use pages::PagesState;

/// Create the router for every page and endpoint.
pub fn create_router(
    db: Database,
    bridge: Arc<LoginBridge>,
    cookies: CookieSettings,
    rate_limit: Arc<RateLimitConfig>,
    providers: Arc<OAuth2Providers>,
    resolver: Arc<dyn IdentityResolver>,
) -> Router {
    let auth_state = AuthState {
        bridge: bridge.clone(),
        users: db.users(),
        cookies,
        oauth2_providers: providers.names().into_iter().map(String::from).collect(),
    };

    let oauth2_state = OAuth2State {
        providers,
        resolver,
        bridge,
        cookies,
    };

    let pages_state = PagesState { users: db.users() };

    Router::new()
        .merge(auth::router(auth_state, rate_limit))
        .merge(oauth2::router(oauth2_state))
        .merge(pages::router(pages_state))
}
