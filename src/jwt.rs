//! JWT token issuance and validation.
//!
//! Access and refresh tokens share one claim layout and are told apart by the
//! `typ` claim. Every validation is all-or-nothing: a token either yields its
//! full claim set or an error.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::Role;

/// Default access token lifetime: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Default refresh token lifetime: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for either lifetime: 400 days, the longest cookie Max-Age
/// browsers honor.
pub const MAX_TOKEN_DURATION_SECS: u64 = 400 * 24 * 60 * 60;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived, stateless
    Access,
    /// Long-lived, mirrored in the refresh session store
    Refresh,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Role claim, e.g. `ROLE_USER`
    pub role: Role,
    /// Token type
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Per-issue nonce so two tokens issued in the same second differ
    pub jti: String,
}

/// Secret and lifetimes used to build a [`JwtConfig`].
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: Vec<u8>,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl JwtSettings {
    /// Settings with the default lifetimes (1 hour access, 7 days refresh).
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }

    pub fn with_lifetimes(mut self, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        self.access_ttl_secs = access_ttl_secs;
        self.refresh_ttl_secs = refresh_ttl_secs;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.access_ttl_secs == 0 {
            return Err(ConfigError::ZeroLifetime(TokenKind::Access));
        }
        if self.refresh_ttl_secs == 0 {
            return Err(ConfigError::ZeroLifetime(TokenKind::Refresh));
        }
        if self.access_ttl_secs > MAX_TOKEN_DURATION_SECS {
            return Err(ConfigError::LifetimeTooLong(TokenKind::Access));
        }
        if self.refresh_ttl_secs > MAX_TOKEN_DURATION_SECS {
            return Err(ConfigError::LifetimeTooLong(TokenKind::Refresh));
        }
        Ok(())
    }
}

/// Signing keys and lifetimes. Immutable once built.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    pub kind: TokenKind,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds, used as the cookie Max-Age
    pub duration: u64,
}

impl JwtConfig {
    /// Build a codec, rejecting an empty secret or an out-of-range lifetime.
    pub fn new(settings: &JwtSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(&settings.secret),
            decoding_key: DecodingKey::from_secret(&settings.secret),
            access_ttl_secs: settings.access_ttl_secs,
            refresh_ttl_secs: settings.refresh_ttl_secs,
        })
    }

    pub fn lifetime(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        }
    }

    /// Issue a token of the given kind, expiring after the configured lifetime.
    pub fn issue(&self, subject: &str, role: Role, kind: TokenKind) -> Result<IssuedToken, JwtError> {
        self.issue_at(subject, role, kind, now_secs()?)
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        kind: TokenKind,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let duration = self.lifetime(kind);
        let exp = now.checked_add(duration).ok_or(JwtError::TimeError)?;

        let claims = Claims {
            sub: subject.to_string(),
            role,
            kind,
            iat: now,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            kind,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Verify signature and expiry, returning the claims of either kind.
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_at(token, now_secs()?)
    }

    /// Verify a token against an explicit clock. A token is expired once `now >= exp`.
    pub fn validate_at(&self, token: &str, now: u64) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below so that the boundary is `now >= exp`.
        validation.validate_exp = false;
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;

        if now >= token_data.claims.exp {
            return Err(JwtError::Expired);
        }

        Ok(token_data.claims)
    }

    /// Validate a token that must be an access token.
    pub fn validate_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_kind_at(token, TokenKind::Access, now_secs()?)
    }

    /// Validate a token that must be a refresh token.
    pub fn validate_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.validate_kind_at(token, TokenKind::Refresh, now_secs()?)
    }

    pub fn validate_kind_at(&self, token: &str, kind: TokenKind, now: u64) -> Result<Claims, JwtError> {
        let claims = self.validate_at(token, now)?;
        if claims.kind != kind {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Malformed token or signature mismatch
    Decoding(jsonwebtoken::errors::Error),
    /// `now >= exp`
    Expired,
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}

/// Rejected [`JwtSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptySecret,
    ZeroLifetime(TokenKind),
    /// Longer than [`MAX_TOKEN_DURATION_SECS`]
    LifetimeTooLong(TokenKind),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptySecret => write!(f, "JWT secret must not be empty"),
            ConfigError::ZeroLifetime(TokenKind::Access) => {
                write!(f, "Access token lifetime must be positive")
            }
            ConfigError::ZeroLifetime(TokenKind::Refresh) => {
                write!(f, "Refresh token lifetime must be positive")
            }
            ConfigError::LifetimeTooLong(kind) => write!(
                f,
                "{} token lifetime must not exceed {} seconds",
                match kind {
                    TokenKind::Access => "Access",
                    TokenKind::Refresh => "Refresh",
                },
                MAX_TOKEN_DURATION_SECS
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
