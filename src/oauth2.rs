//! Third-party (OAuth2 authorization code) login.
//!
//! The provider redirects back with a code. An [`IdentityResolver`] exchanges
//! it for the provider's user attributes and maps them onto a local account,
//! exposing the account name under [`USERNAME_ATTRIBUTE`] for the login bridge.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::UNUSABLE_PASSWORD;
use crate::db::{NewUser, Role, User, UserStore};

/// Attribute carrying the local account name the tokens are issued for.
pub const USERNAME_ATTRIBUTE: &str = "username_for_jwt";

/// Cookie holding the anti-forgery `state` between redirect and callback.
pub const STATE_COOKIE_NAME: &str = "oauth2_state";

/// Path the state cookie is scoped to (the callback prefix).
pub const STATE_COOKIE_PATH: &str = "/login/oauth2";

/// How long a started third-party login stays valid.
pub const STATE_MAX_AGE_SECS: u64 = 600;

/// Providers with presets. Their username prefixes stay reserved even when
/// they are not configured.
pub const BUILTIN_PROVIDERS: [&str; 2] = ["google", "github"];

/// Endpoints and credentials for one provider.
#[derive(Debug, Clone)]
pub struct OAuth2ProviderConfig {
    /// Registration id used in the routes (`google`, `github`, ...)
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    /// Userinfo field holding the provider's stable user id
    pub id_field: String,
    /// Absolute URL of `/login/oauth2/code/{name}` on this server
    pub redirect_uri: String,
}

impl OAuth2ProviderConfig {
    pub fn google(client_id: String, client_secret: String, public_url: &str) -> Self {
        Self {
            name: "google".to_string(),
            client_id,
            client_secret,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string(), "email".to_string()],
            id_field: "sub".to_string(),
            redirect_uri: callback_url(public_url, "google"),
        }
    }

    pub fn github(client_id: String, client_secret: String, public_url: &str) -> Self {
        Self {
            name: "github".to_string(),
            client_id,
            client_secret,
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_url: "https://api.github.com/user".to_string(),
            scopes: vec!["read:user".to_string()],
            id_field: "id".to_string(),
            redirect_uri: callback_url(public_url, "github"),
        }
    }

    /// The provider URL the browser is sent to.
    pub fn authorization_url(&self, state: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);
        Ok(url)
    }
}

fn callback_url(public_url: &str, provider: &str) -> String {
    format!(
        "{}/login/oauth2/code/{}",
        public_url.trim_end_matches('/'),
        provider
    )
}

/// Registered providers by name.
#[derive(Debug, Clone, Default)]
pub struct OAuth2Providers {
    providers: HashMap<String, OAuth2ProviderConfig>,
}

impl OAuth2Providers {
    pub fn new(configs: Vec<OAuth2ProviderConfig>) -> Self {
        Self {
            providers: configs.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OAuth2ProviderConfig> {
        self.providers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A user authenticated by a third-party provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuth2User {
    pub provider: String,
    pub attributes: Map<String, Value>,
}

impl OAuth2User {
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug)]
pub enum OAuth2Error {
    UnknownProvider(String),
    /// Code-for-token exchange failed
    Exchange(String),
    /// Fetching the user attributes failed
    UserInfo(String),
    /// Userinfo response lacked the id field
    MissingId(String),
    /// Local account lookup or creation failed
    Account(String),
}

impl std::fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OAuth2Error::UnknownProvider(p) => write!(f, "Unknown OAuth2 provider: {}", p),
            OAuth2Error::Exchange(e) => write!(f, "Token exchange failed: {}", e),
            OAuth2Error::UserInfo(e) => write!(f, "Userinfo request failed: {}", e),
            OAuth2Error::MissingId(field) => write!(f, "Userinfo has no '{}' field", field),
            OAuth2Error::Account(e) => write!(f, "Account error: {}", e),
        }
    }
}

impl std::error::Error for OAuth2Error {}

/// Turns an authorization code into an [`OAuth2User`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, provider: &str, code: &str) -> Result<OAuth2User, OAuth2Error>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Resolver that talks to the provider over HTTP and finds or creates the
/// local account `{provider}_{id}`.
pub struct HttpIdentityResolver {
    client: reqwest::Client,
    providers: OAuth2Providers,
    users: UserStore,
}

impl HttpIdentityResolver {
    pub fn new(providers: OAuth2Providers, users: UserStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            providers,
            users,
        }
    }

    async fn exchange_code(
        &self,
        provider: &OAuth2ProviderConfig,
        code: &str,
    ) -> Result<String, OAuth2Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&provider.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OAuth2Error::Exchange(e.to_string()))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuth2Error::Exchange(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn fetch_userinfo(
        &self,
        provider: &OAuth2ProviderConfig,
        access_token: &str,
    ) -> Result<Map<String, Value>, OAuth2Error> {
        self.client
            .get(&provider.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, "trailboard")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OAuth2Error::UserInfo(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuth2Error::UserInfo(e.to_string()))
    }

    /// Find or create the local account for a provider identity. A row with
    /// the same name that belongs to another provider, or to a password user,
    /// is never reused.
    async fn ensure_account(&self, provider: &str, provider_id: &str) -> Result<String, OAuth2Error> {
        let username = local_username(provider, provider_id);

        let existing = self
            .users
            .get_by_username(&username)
            .await
            .map_err(|e| OAuth2Error::Account(e.to_string()))?;
        if let Some(user) = existing {
            return owned_by(&user, provider).map(|()| username);
        }

        let created = self
            .users
            .create(NewUser {
                username: &username,
                password_hash: UNUSABLE_PASSWORD,
                role: Role::User,
                provider: Some(provider),
            })
            .await;

        match created {
            Ok(_) => {
                info!(username = %username, provider = %provider, "Created account for OAuth2 user");
                Ok(username)
            }
            // Lost a race with a concurrent first login
            Err(e) => match self.users.get_by_username(&username).await {
                Ok(Some(user)) => owned_by(&user, provider).map(|()| username),
                _ => Err(OAuth2Error::Account(e.to_string())),
            },
        }
    }
}

fn owned_by(user: &User, provider: &str) -> Result<(), OAuth2Error> {
    if user.provider.as_deref() == Some(provider) {
        return Ok(());
    }
    warn!(
        username = %user.username,
        provider = %provider,
        "OAuth2 identity collides with a foreign account"
    );
    Err(OAuth2Error::Account(format!(
        "account {} is not linked to {}",
        user.username, provider
    )))
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, provider: &str, code: &str) -> Result<OAuth2User, OAuth2Error> {
        let config = self
            .providers
            .get(provider)
            .ok_or_else(|| OAuth2Error::UnknownProvider(provider.to_string()))?;

        let access_token = self.exchange_code(config, code).await?;
        let mut attributes = self.fetch_userinfo(config, &access_token).await?;

        let provider_id = attribute_id(&attributes, &config.id_field)
            .ok_or_else(|| OAuth2Error::MissingId(config.id_field.clone()))?;
        debug!(provider = %provider, id = %provider_id, "Resolved OAuth2 identity");

        let username = self.ensure_account(provider, &provider_id).await?;
        attributes.insert(USERNAME_ATTRIBUTE.to_string(), Value::String(username));

        Ok(OAuth2User {
            provider: provider.to_string(),
            attributes,
        })
    }
}

/// Local account name for a provider identity.
pub fn local_username(provider: &str, provider_id: &str) -> String {
    format!("{}_{}", provider, provider_id)
}

/// Whether `username` lies in the namespace of a built-in or configured
/// provider, and so cannot be taken by a password registration.
pub fn is_provider_username<S: AsRef<str>>(username: &str, configured: &[S]) -> bool {
    let lower = username.to_ascii_lowercase();
    BUILTIN_PROVIDERS
        .iter()
        .copied()
        .chain(configured.iter().map(AsRef::as_ref))
        .any(|provider| lower.starts_with(&format!("{}_", provider.to_ascii_lowercase())))
}

/// Read an id attribute that may be a string or a number.
fn attribute_id(attributes: &Map<String, Value>, field: &str) -> Option<String> {
    match attributes.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
