//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::auth::OAuth2RoleSource;
use crate::db::Database;
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, JwtSettings, MAX_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS,
};
use crate::oauth2::OAuth2ProviderConfig;
use crate::rate_limit::DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Trailboard",
    about = "Travel board with cookie-based JWT sessions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "trailboard.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds (also the refresh session TTL)
    #[arg(
        long,
        default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub refresh_ttl_secs: u64,

    /// Public base URL, used for OAuth2 redirect URIs and to decide the Secure cookie flag
    #[arg(long, default_value = "http://localhost:8080")]
    pub public_url: String,

    /// Key rate limits by X-Forwarded-For (only behind a trusted proxy)
    #[arg(long)]
    pub trust_proxy: bool,

    /// Seconds to wait for a database connection before treating the store as unreachable
    #[arg(long, default_value = "5")]
    pub store_timeout_secs: u64,

    /// Password login attempts per minute per client IP
    #[arg(long, default_value_t = DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE)]
    pub login_attempts_per_minute: u32,

    /// Google OAuth2 client id
    #[arg(long, env = "OAUTH2_GOOGLE_CLIENT_ID")]
    pub oauth2_google_client_id: Option<String>,

    /// Google OAuth2 client secret
    #[arg(long, env = "OAUTH2_GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub oauth2_google_client_secret: Option<String>,

    /// GitHub OAuth2 client id
    #[arg(long, env = "OAUTH2_GITHUB_CLIENT_ID")]
    pub oauth2_github_client_id: Option<String>,

    /// GitHub OAuth2 client secret
    #[arg(long, env = "OAUTH2_GITHUB_CLIENT_SECRET", hide_env_values = true)]
    pub oauth2_github_client_secret: Option<String>,

    /// Role claim for OAuth2 logins
    #[arg(long, default_value = "default")]
    pub oauth2_role_source: OAuth2RoleSource,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %public_url, "Public URL must use http or https");
        return None;
    }

    if url.scheme() != "https" && url.host_str() != Some("localhost") {
        warn!("Public URL is not HTTPS; cookies will be sent without the Secure flag");
    }

    Some(url)
}

/// Collect the OAuth2 providers that have both a client id and a secret.
pub fn oauth2_providers(args: &Args, public_url: &Url) -> Vec<OAuth2ProviderConfig> {
    let base = public_url.as_str();
    let mut providers = Vec::new();

    let pairs = [
        (
            "google",
            &args.oauth2_google_client_id,
            &args.oauth2_google_client_secret,
        ),
        (
            "github",
            &args.oauth2_github_client_id,
            &args.oauth2_github_client_secret,
        ),
    ];

    for (name, id, secret) in pairs {
        match (id, secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                let config = match name {
                    "google" => OAuth2ProviderConfig::google(id.clone(), secret.clone(), base),
                    _ => OAuth2ProviderConfig::github(id.clone(), secret.clone(), base),
                };
                info!(provider = %name, redirect_uri = %config.redirect_uri, "OAuth2 provider enabled");
                providers.push(config);
            }
            (None, None) => {}
            _ => warn!(provider = %name, "OAuth2 provider needs both a client id and a secret"),
        }
    }

    providers
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, public_url: &Url, jwt_secret: String) -> ServerConfig {
    let mut config = ServerConfig::new(
        db,
        JwtSettings::new(jwt_secret.into_bytes())
            .with_lifetimes(args.access_ttl_secs, args.refresh_ttl_secs),
    );
    config.secure_cookies = public_url.scheme() == "https";
    config.trust_proxy = args.trust_proxy;
    config.login_attempts_per_minute = args.login_attempts_per_minute;
    config.oauth2_providers = oauth2_providers(args, public_url);
    config.oauth2_role_source = args.oauth2_role_source;
    config
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str, store_timeout_secs: u64) -> Option<Database> {
    match Database::open_with_timeout(path, Duration::from_secs(store_timeout_secs)).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
