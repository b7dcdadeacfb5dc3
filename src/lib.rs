pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod oauth2;
pub mod rate_limit;

use api::create_router;
use auth::{
    AccessRules, CookieSettings, FilterChain, LoginBridge, OAuth2RoleSource, RefreshTokenStore,
    authorize, credential_filter,
};
use axum::{Router, middleware};
use db::Database;
use jwt::{ConfigError, JwtConfig, JwtSettings};
use oauth2::{HttpIdentityResolver, IdentityResolver, OAuth2ProviderConfig, OAuth2Providers};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret and token lifetimes
    pub jwt: JwtSettings,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Key rate limits by X-Forwarded-For (requires running behind a proxy)
    pub trust_proxy: bool,
    /// Password login attempts per minute per client IP
    pub login_attempts_per_minute: u32,
    pub oauth2_providers: Vec<OAuth2ProviderConfig>,
    pub oauth2_role_source: OAuth2RoleSource,
    /// Replaces the database-backed refresh store
    pub token_store: Option<Arc<dyn RefreshTokenStore>>,
    /// Replaces the HTTP identity resolver used for OAuth2 callbacks
    pub identity_resolver: Option<Arc<dyn IdentityResolver>>,
}

impl ServerConfig {
    /// Configuration with default lifetimes, limits and no OAuth2 providers.
    pub fn new(db: Database, jwt: JwtSettings) -> Self {
        Self {
            db,
            jwt,
            secure_cookies: false,
            trust_proxy: false,
            login_attempts_per_minute: rate_limit::DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE,
            oauth2_providers: Vec::new(),
            oauth2_role_source: OAuth2RoleSource::default(),
            token_store: None,
            identity_resolver: None,
        }
    }
}

/// Create the application router with the given configuration.
///
/// Request flow: credential filter chain, then access rules, then the route.
pub fn create_app(config: &ServerConfig) -> Result<Router, ConfigError> {
    build_app(config).map(|(app, _)| app)
}

fn build_app(config: &ServerConfig) -> Result<(Router, Arc<RateLimitConfig>), ConfigError> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt)?);
    let cookies = CookieSettings::new(config.secure_cookies);

    let tokens: Arc<dyn RefreshTokenStore> = match &config.token_store {
        Some(store) => store.clone(),
        None => Arc::new(config.db.refresh_sessions(config.jwt.refresh_ttl_secs)),
    };

    let providers = Arc::new(OAuth2Providers::new(config.oauth2_providers.clone()));
    let resolver: Arc<dyn IdentityResolver> = match &config.identity_resolver {
        Some(resolver) => resolver.clone(),
        None => Arc::new(HttpIdentityResolver::new(
            (*providers).clone(),
            config.db.users(),
        )),
    };

    let bridge = Arc::new(LoginBridge::new(
        jwt.clone(),
        tokens.clone(),
        Arc::new(config.db.users()),
        cookies,
        config.oauth2_role_source,
    ));

    let rate_limit = Arc::new(RateLimitConfig::new(
        config.login_attempts_per_minute,
        config.trust_proxy,
    ));

    let chain = Arc::new(FilterChain::standard(jwt, tokens, cookies));
    let rules = Arc::new(AccessRules::board_defaults());

    let app = create_router(
        config.db.clone(),
        bridge,
        cookies,
        rate_limit.clone(),
        providers,
        resolver,
    )
    .layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(chain, credential_filter))
            .layer(middleware::from_fn_with_state(rules, authorize)),
    );
    Ok((app, rate_limit))
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Cleanup runs once at startup and then hourly while the server is up.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let (app, rate_limit) = build_app(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let cleanup = cleanup::spawn_cleanup_scheduler(
        config.db.refresh_sessions(config.jwt.refresh_ttl_secs),
        rate_limit,
    );

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service).await;
    cleanup.abort();
    result
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
