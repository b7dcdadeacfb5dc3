//! Axum extractors over the security context attached by the filter chain.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use super::rules::LOGIN_PATH;
use super::types::SecurityContext;

/// Extractor for handlers that require an identity.
/// Without one, redirects to the login page.
pub struct Authenticated(pub SecurityContext);

/// Rejection for [`Authenticated`].
#[derive(Debug)]
pub struct LoginRequired;

impl IntoResponse for LoginRequired {
    fn into_response(self) -> Response {
        Redirect::to(LOGIN_PATH).into_response()
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = LoginRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .map(Authenticated)
            .ok_or(LoginRequired)
    }
}

/// Optional authentication extractor - never fails.
/// Useful for pages that work both authenticated and unauthenticated.
pub struct MaybeAuthenticated(pub Option<SecurityContext>);

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(
            parts.extensions.get::<SecurityContext>().cloned(),
        ))
    }
}
