//! Credential filter chain.
//!
//! An explicit, ordered list of request interceptors that turn the auth cookies
//! into a [`SecurityContext`]. The default order is:
//!
//! 1. [`RefreshFilter`]: when the access token is missing or invalid, checks the
//!    refresh token against the store and reissues an access token.
//! 2. [`AccessFilter`]: builds the context from a valid access token.
//!
//! Filters never reject a request. Every failure means "no context" and the
//! authorization rules decide what happens next.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::cookie::{
    ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, get_cookie, set_cookie_name,
};
use super::store::RefreshTokenStore;
use super::types::SecurityContext;
use crate::jwt::{JwtConfig, TokenKind};

/// What a filter decided for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Pass on with this identity attached
    Authenticated(SecurityContext),
    /// Pass on without adding an identity
    Continue,
}

/// Per-request state threaded through the chain.
pub struct Exchange<'a> {
    headers: &'a HeaderMap,
    /// Access token reissued earlier in the chain, preferred over the cookie
    access_override: Option<String>,
    context: Option<SecurityContext>,
    set_cookies: Vec<String>,
}

impl<'a> Exchange<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            access_override: None,
            context: None,
            set_cookies: Vec::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&'a str> {
        get_cookie(self.headers, name)
    }

    /// The access token the request currently carries.
    pub fn access_token(&self) -> Option<&str> {
        self.access_override
            .as_deref()
            .or_else(|| self.cookie(ACCESS_COOKIE_NAME))
    }

    pub fn context(&self) -> Option<&SecurityContext> {
        self.context.as_ref()
    }

    /// Queue a Set-Cookie header for the response.
    pub fn add_cookie(&mut self, set_cookie: String) {
        self.set_cookies.push(set_cookie);
    }
}

/// A single request interceptor.
#[async_trait]
pub trait CredentialFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn filter(&self, exchange: &mut Exchange<'_>) -> FilterOutcome;
}

/// Reissues an access token from a refresh token that matches the store record.
pub struct RefreshFilter {
    jwt: Arc<JwtConfig>,
    tokens: Arc<dyn RefreshTokenStore>,
    cookies: CookieSettings,
}

impl RefreshFilter {
    pub fn new(
        jwt: Arc<JwtConfig>,
        tokens: Arc<dyn RefreshTokenStore>,
        cookies: CookieSettings,
    ) -> Self {
        Self {
            jwt,
            tokens,
            cookies,
        }
    }
}

#[async_trait]
impl CredentialFilter for RefreshFilter {
    fn name(&self) -> &'static str {
        "refresh"
    }

    async fn filter(&self, exchange: &mut Exchange<'_>) -> FilterOutcome {
        if exchange.context().is_some() {
            return FilterOutcome::Continue;
        }

        // A valid access token needs no refresh
        if let Some(access) = exchange.access_token() {
            if self.jwt.validate_access(access).is_ok() {
                return FilterOutcome::Continue;
            }
        }

        let Some(refresh) = exchange.cookie(REFRESH_COOKIE_NAME) else {
            return FilterOutcome::Continue;
        };

        let claims = match self.jwt.validate_refresh(refresh) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Rejected refresh token");
                return FilterOutcome::Continue;
            }
        };

        // Only the subject's current refresh token may mint access tokens
        match self.tokens.find_by_subject(&claims.sub).await {
            Ok(Some(stored)) if stored == refresh => {}
            Ok(_) => {
                debug!(subject = %claims.sub, "Refresh token does not match the active session");
                return FilterOutcome::Continue;
            }
            Err(e) => {
                warn!(subject = %claims.sub, error = %e, "Failed to look up refresh session");
                return FilterOutcome::Continue;
            }
        }

        let issued = match self.jwt.issue(&claims.sub, claims.role, TokenKind::Access) {
            Ok(issued) => issued,
            Err(e) => {
                warn!(subject = %claims.sub, error = %e, "Failed to reissue access token");
                return FilterOutcome::Continue;
            }
        };

        debug!(subject = %claims.sub, "Reissued access token");
        exchange.add_cookie(
            self.cookies
                .set(ACCESS_COOKIE_NAME, &issued.token, issued.duration),
        );
        exchange.access_override = Some(issued.token);

        FilterOutcome::Authenticated(SecurityContext::from_claims(&claims))
    }
}

/// Builds the security context from a valid access token.
pub struct AccessFilter {
    jwt: Arc<JwtConfig>,
}

impl AccessFilter {
    pub fn new(jwt: Arc<JwtConfig>) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl CredentialFilter for AccessFilter {
    fn name(&self) -> &'static str {
        "access"
    }

    async fn filter(&self, exchange: &mut Exchange<'_>) -> FilterOutcome {
        if exchange.context().is_some() {
            return FilterOutcome::Continue;
        }

        match exchange.access_token().map(|t| self.jwt.validate_access(t)) {
            Some(Ok(claims)) => FilterOutcome::Authenticated(SecurityContext::from_claims(&claims)),
            _ => FilterOutcome::Continue,
        }
    }
}

/// Result of running the chain over one request.
#[derive(Debug, Default)]
pub struct Resolution {
    pub context: Option<SecurityContext>,
    /// Set-Cookie values to add to the response
    pub set_cookies: Vec<String>,
}

/// Ordered dispatcher over the credential filters.
pub struct FilterChain {
    filters: Vec<Box<dyn CredentialFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn CredentialFilter>>) -> Self {
        Self { filters }
    }

    /// The standard chain: refresh first, then access.
    pub fn standard(
        jwt: Arc<JwtConfig>,
        tokens: Arc<dyn RefreshTokenStore>,
        cookies: CookieSettings,
    ) -> Self {
        Self::new(vec![
            Box::new(RefreshFilter::new(jwt.clone(), tokens, cookies)),
            Box::new(AccessFilter::new(jwt)),
        ])
    }

    /// Names of the filters in execution order.
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every filter in order. The first context produced wins.
    pub async fn resolve(&self, headers: &HeaderMap) -> Resolution {
        let mut exchange = Exchange::new(headers);

        for filter in &self.filters {
            if let FilterOutcome::Authenticated(ctx) = filter.filter(&mut exchange).await {
                if exchange.context.is_none() {
                    exchange.context = Some(ctx);
                }
            }
        }

        Resolution {
            context: exchange.context,
            set_cookies: exchange.set_cookies,
        }
    }
}

/// Middleware that runs the filter chain, attaches the resulting
/// [`SecurityContext`] to the request, and forwards queued cookies.
///
/// Cookies the handler sets itself take precedence, so a logout that clears
/// the access cookie is not undone by a reissue earlier in the same request.
pub async fn credential_filter(
    State(chain): State<Arc<FilterChain>>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolution = chain.resolve(request.headers()).await;
    if let Some(ctx) = resolution.context {
        request.extensions_mut().insert(ctx);
    }

    let mut response = next.run(request).await;

    for cookie in resolution.set_cookies {
        let name = set_cookie_name(&cookie).unwrap_or_default().to_string();
        let already_set = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| set_cookie_name(v) == Some(name.as_str()));
        if already_set {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    response
}
