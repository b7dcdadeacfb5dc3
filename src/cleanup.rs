//! Scheduled cleanup of expired refresh sessions and idle rate limit state.

use crate::db::RefreshSessionStore;
use crate::rate_limit::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(sessions: &RefreshSessionStore, rate_limit: &RateLimitConfig) {
    match sessions.delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired refresh sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired refresh sessions: {}", e),
    }

    let dropped = rate_limit.retain_recent();
    if dropped > 0 {
        debug!("Dropped rate limit state for {} idle clients", dropped);
    }
}

/// Spawn a background task that runs cleanup now and then periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    sessions: RefreshSessionStore,
    rate_limit: Arc<RateLimitConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&sessions, &rate_limit).await;
        }
    })
}
