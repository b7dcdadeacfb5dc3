//! Storage capabilities consumed by the authentication core.
//!
//! The filter chain and the login bridge only see these traits, so the SQLite
//! stores can be swapped for another backend (or a failing one in tests).

use async_trait::async_trait;

use crate::db::{RefreshSessionStore, User, UserStore};

/// Failure talking to a backing store.
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached (closed pool, timeout, I/O)
    Unavailable(String),
    /// The store answered with an error
    Query(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {}", e),
            StoreError::Query(e) => write!(f, "Store query failed: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Subject → latest refresh token.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Insert or replace the subject's refresh token.
    async fn save(&self, subject: &str, token: &str) -> Result<(), StoreError>;

    async fn find_by_subject(&self, subject: &str) -> Result<Option<String>, StoreError>;

    /// Remove the subject's record. Deleting a missing record succeeds.
    async fn delete(&self, subject: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl RefreshTokenStore for RefreshSessionStore {
    async fn save(&self, subject: &str, token: &str) -> Result<(), StoreError> {
        RefreshSessionStore::save(self, subject, token)
            .await
            .map_err(StoreError::from)
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(subject).await?.map(|session| session.token))
    }

    async fn delete(&self, subject: &str) -> Result<(), StoreError> {
        RefreshSessionStore::delete(self, subject).await?;
        Ok(())
    }
}

/// Username → account lookup used by password authentication.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
impl UserLookup for UserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.get_by_username(username).await.map_err(StoreError::from)
    }
}
