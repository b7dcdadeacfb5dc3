//! Rate limiting for login and registration.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Default password login attempts per minute per IP.
pub const DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE: u32 = 10;

/// Registrations per minute per IP.
const REGISTRATIONS_PER_MINUTE: u32 = 3;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for the credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for POST /auth/login
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for POST /auth/register (never looser than login)
    pub register: Arc<IpLimiter>,
    /// Key by `X-Forwarded-For` instead of the socket address
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    /// A zero rate is raised to one request per minute.
    pub fn new(login_per_minute: u32, trust_proxy: bool) -> Self {
        let login = NonZeroU32::new(login_per_minute).unwrap_or(NonZeroU32::MIN);
        let register = NonZeroU32::new(REGISTRATIONS_PER_MINUTE.max(login_per_minute / 3))
            .unwrap_or(NonZeroU32::MIN)
            .min(login);

        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(login))),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(register))),
            trust_proxy,
        }
    }
}

impl RateLimitConfig {
    /// Forget clients whose buckets have fully refilled. Limits in progress
    /// are kept. Returns how many keys were dropped.
    pub fn retain_recent(&self) -> usize {
        let before = self.login.len() + self.register.len();
        self.login.retain_recent();
        self.register.retain_recent();
        self.login.shrink_to_fit();
        self.register.shrink_to_fit();
        before.saturating_sub(self.login.len() + self.register.len())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE, false)
    }
}

/// Middleware for rate limiting password logins.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, config.trust_proxy);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}

/// Middleware for rate limiting registrations.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, config.trust_proxy);

    match config.register.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many signup attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_quota_is_per_key() {
        let config = RateLimitConfig::new(2, false);
        assert!(config.login.check_key(&"1.1.1.1".to_string()).is_ok());
        assert!(config.login.check_key(&"1.1.1.1".to_string()).is_ok());
        assert!(config.login.check_key(&"1.1.1.1".to_string()).is_err());
        assert!(config.login.check_key(&"2.2.2.2".to_string()).is_ok());
    }

    #[test]
    fn test_zero_rate_still_allows_one() {
        let config = RateLimitConfig::new(0, false);
        assert!(config.login.check_key(&"ip".to_string()).is_ok());
        assert!(config.login.check_key(&"ip".to_string()).is_err());
        assert!(config.register.check_key(&"ip".to_string()).is_ok());
        assert!(config.register.check_key(&"ip".to_string()).is_err());
    }

    #[test]
    fn test_retain_recent_keeps_active_limits() {
        let config = RateLimitConfig::new(2, false);
        let ip = "3.3.3.3".to_string();
        assert!(config.login.check_key(&ip).is_ok());
        assert!(config.login.check_key(&ip).is_ok());
        assert_eq!(config.login.len(), 1);

        assert_eq!(config.retain_recent(), 0);
        assert_eq!(config.login.len(), 1);
        assert!(config.login.check_key(&ip).is_err());
    }
}
