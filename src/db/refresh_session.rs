//! Refresh session storage: the latest refresh token per subject.
//!
//! A save replaces whatever the subject had before, so each user has at most one
//! live refresh session. Records carry an absolute expiry equal to the refresh
//! token lifetime and are invisible once it passes.

use sqlx::sqlite::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored refresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub subject: String,
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
}

/// Store for refresh sessions.
#[derive(Clone)]
pub struct RefreshSessionStore {
    pool: SqlitePool,
    ttl_secs: u64,
}

impl RefreshSessionStore {
    pub fn new(pool: SqlitePool, ttl_secs: u64) -> Self {
        Self { pool, ttl_secs }
    }

    /// Insert or replace the refresh token for `subject`.
    pub async fn save(&self, subject: &str, token: &str) -> Result<(), sqlx::Error> {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let expires_at = unix_now().saturating_add(ttl);
        sqlx::query(
            "INSERT INTO refresh_sessions (subject, token, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(subject) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at,
                updated_at = datetime('now')",
        )
        .bind(subject)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the live session for `subject`, ignoring expired records.
    pub async fn get(&self, subject: &str) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT subject, token, expires_at FROM refresh_sessions WHERE subject = ? AND expires_at > ?",
        )
        .bind(subject)
        .bind(unix_now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(subject, token, expires_at)| RefreshSession {
            subject,
            token,
            expires_at,
        }))
    }

    /// Delete the session for `subject`. Returns whether a record existed.
    pub async fn delete(&self, subject: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE subject = ?")
            .bind(subject)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all expired sessions.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= ?")
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_save_overwrites_previous_token() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions(60);

        store.save("alice", "t1").await.unwrap();
        store.save("alice", "t2").await.unwrap();

        let session = store.get("alice").await.unwrap().unwrap();
        assert_eq!(session.token, "t2");

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_sessions WHERE subject = 'alice'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_subjects_are_isolated() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions(60);

        store.save("alice", "ta").await.unwrap();
        store.save("bob", "tb").await.unwrap();

        assert_eq!(store.get("alice").await.unwrap().unwrap().token, "ta");
        assert_eq!(store.get("bob").await.unwrap().unwrap().token, "tb");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions(60);

        store.save("alice", "t1").await.unwrap();
        assert!(store.delete("alice").await.unwrap());
        assert!(!store.delete("alice").await.unwrap());
        assert!(store.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_hidden_and_cleaned() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions(60);

        store.save("alice", "t1").await.unwrap();
        sqlx::query("UPDATE refresh_sessions SET expires_at = expires_at - 3600")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(store.get("alice").await.unwrap().is_none());
        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert_eq!(store.delete_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions(u64::MAX);

        store.save("alice", "t1").await.unwrap();
        let session = store.get("alice").await.unwrap().unwrap();
        assert_eq!(session.expires_at, i64::MAX);
    }
}
