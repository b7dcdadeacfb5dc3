//! Cookie-carried JWT authentication with role-based access control.
//!
//! Dual-token system: short-lived access tokens (1 hour, stateless) and
//! long-lived refresh tokens (7 days, one active token per subject in the
//! store). A credential filter chain resolves the request identity and
//! reissues expired access tokens; access rules then allow, redirect to
//! login, or forbid.

mod bridge;
mod cookie;
mod extractors;
mod filter;
mod ip;
mod password;
mod rules;
mod store;
mod types;

pub use bridge::{BridgeError, LoginBridge, OAuth2RoleSource, SessionCookies};
pub use cookie::{
    ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, get_cookie, set_cookie_name,
};
pub use extractors::{Authenticated, LoginRequired, MaybeAuthenticated};
pub use filter::{
    AccessFilter, CredentialFilter, Exchange, FilterChain, FilterOutcome, RefreshFilter,
    Resolution, credential_filter,
};
pub use ip::{FORWARDED_FOR_HEADER, HasHeadersAndExtensions, extract_client_ip};
pub use password::{UNUSABLE_PASSWORD, hash_password, verify_password};
pub use rules::{
    AccessRule, AccessRules, Decision, LOGIN_PATH, PathPattern, Requirement, authorize,
};
pub use store::{RefreshTokenStore, StoreError, UserLookup};
pub use types::{Principal, SecurityContext};
