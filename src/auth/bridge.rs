//! Login bridge: every login method ends in [`LoginBridge::issue_session`].
//!
//! Password login and third-party login each resolve a [`Principal`] and hand
//! it to the same issuance step, which signs the token pair, records the
//! refresh token, and produces both cookies.

use std::sync::{Arc, LazyLock};

use axum::{
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use tracing::{error, info, warn};

use super::cookie::{ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME};
use super::password::{hash_password, verify_password};
use super::store::{RefreshTokenStore, StoreError, UserLookup};
use super::types::Principal;
use crate::db::Role;
use crate::jwt::{JwtConfig, JwtError, TokenKind};
use crate::oauth2::{OAuth2User, USERNAME_ATTRIBUTE};

/// Hash checked when the username is unknown, so both outcomes cost the same.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("trailboard-dummy-password").unwrap_or_default());

/// How third-party logins obtain their role claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OAuth2RoleSource {
    /// Always `ROLE_USER`, whatever the account's stored role
    #[default]
    Default,
    /// The role stored on the local account, like password logins
    Account,
}

/// Why a login could not produce a session.
#[derive(Debug)]
pub enum BridgeError {
    /// Unknown user or wrong password
    BadCredentials,
    /// Third-party login without the username attribute
    MissingIdentity,
    /// Third-party login named an account that does not exist
    UnknownAccount(String),
    Store(StoreError),
    Token(JwtError),
    Internal(String),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::BadCredentials => write!(f, "Bad credentials"),
            BridgeError::MissingIdentity => {
                write!(f, "Missing {} attribute", USERNAME_ATTRIBUTE)
            }
            BridgeError::UnknownAccount(name) => write!(f, "No account named {}", name),
            BridgeError::Store(e) => write!(f, "{}", e),
            BridgeError::Token(e) => write!(f, "{}", e),
            BridgeError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        BridgeError::Store(e)
    }
}

impl From<JwtError> for BridgeError {
    fn from(e: JwtError) -> Self {
        BridgeError::Token(e)
    }
}

/// The two Set-Cookie values produced by a successful login.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub access: String,
    pub refresh: String,
}

impl SessionCookies {
    /// Set both cookies and redirect to `location`.
    pub fn redirect(self, location: &str) -> Response {
        (
            AppendHeaders([(SET_COOKIE, self.access), (SET_COOKIE, self.refresh)]),
            Redirect::to(location),
        )
            .into_response()
    }
}

pub struct LoginBridge {
    jwt: Arc<JwtConfig>,
    tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserLookup>,
    cookies: CookieSettings,
    oauth2_role_source: OAuth2RoleSource,
}

impl LoginBridge {
    pub fn new(
        jwt: Arc<JwtConfig>,
        tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserLookup>,
        cookies: CookieSettings,
        oauth2_role_source: OAuth2RoleSource,
    ) -> Self {
        Self {
            jwt,
            tokens,
            users,
            cookies,
            oauth2_role_source,
        }
    }

    /// Verify a username/password pair against the stored account.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, BridgeError> {
        let user = self.users.find_by_username(username).await?;

        // Unknown users still pay for one argon2 verification
        let password = password.to_string();
        let hash = user.as_ref().map(|u| u.password_hash.clone());
        let verified = tokio::task::spawn_blocking(move || match hash {
            Some(hash) => verify_password(&password, &hash),
            None => {
                verify_password(&password, &DUMMY_HASH);
                false
            }
        })
        .await
        .map_err(|e| BridgeError::Internal(e.to_string()))?;

        match user {
            Some(user) if verified => Ok(Principal::from_account(&user)),
            _ => Err(BridgeError::BadCredentials),
        }
    }

    /// Resolve the principal for a completed third-party login.
    pub async fn oauth2_principal(&self, user: &OAuth2User) -> Result<Principal, BridgeError> {
        let username = user
            .attribute_str(USERNAME_ATTRIBUTE)
            .ok_or(BridgeError::MissingIdentity)?;

        let role = match self.oauth2_role_source {
            OAuth2RoleSource::Default => Role::User,
            OAuth2RoleSource::Account => {
                self.users
                    .find_by_username(username)
                    .await?
                    .ok_or_else(|| BridgeError::UnknownAccount(username.to_string()))?
                    .role
            }
        };

        Ok(Principal::new(username, role))
    }

    /// Issue the token pair for `principal`, record the refresh token, and
    /// return both cookies. A store failure fails the login.
    pub async fn issue_session(&self, principal: &Principal) -> Result<SessionCookies, BridgeError> {
        let access = self
            .jwt
            .issue(&principal.subject, principal.role, TokenKind::Access)?;
        let refresh = self
            .jwt
            .issue(&principal.subject, principal.role, TokenKind::Refresh)?;

        self.tokens.save(&principal.subject, &refresh.token).await?;

        Ok(SessionCookies {
            access: self
                .cookies
                .set(ACCESS_COOKIE_NAME, &access.token, access.duration),
            refresh: self
                .cookies
                .set(REFRESH_COOKIE_NAME, &refresh.token, refresh.duration),
        })
    }

    /// Password login: authenticate, then issue.
    pub async fn password_login(&self, username: &str, password: &str) -> Result<SessionCookies, BridgeError> {
        let principal = self.authenticate(username, password).await?;
        let cookies = self.issue_session(&principal).await?;
        info!(subject = %principal.subject, role = %principal.role, "Password login");
        Ok(cookies)
    }

    /// Third-party login: resolve, then issue.
    pub async fn oauth2_login(&self, user: &OAuth2User) -> Result<SessionCookies, BridgeError> {
        let principal = self.oauth2_principal(user).await?;
        let cookies = self.issue_session(&principal).await?;
        info!(
            subject = %principal.subject,
            provider = %user.provider,
            role = %principal.role,
            "OAuth2 login"
        );
        Ok(cookies)
    }

    /// Best-effort server-side logout. Failures are logged and swallowed.
    pub async fn revoke(&self, subject: &str) {
        if let Err(e) = self.tokens.delete(subject).await {
            warn!(subject = %subject, error = %e, "Failed to delete refresh session");
        }
    }

    /// Log a login failure at the right level.
    pub fn log_failure(&self, method: &str, e: &BridgeError) {
        match e {
            BridgeError::BadCredentials | BridgeError::MissingIdentity => {
                warn!(method = %method, error = %e, "Login rejected")
            }
            _ => error!(method = %method, error = %e, "Login failed"),
        }
    }
}
