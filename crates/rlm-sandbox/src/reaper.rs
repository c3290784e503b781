//! Background eviction of expired sessions.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::manager::SessionManager;

/// Spawn the reaper task. On each tick it destroys every session past its
/// idle or absolute TTL; destruction respects the session gate, so an
/// in-flight execution finishes first. Cancel the token to stop the task.
pub fn spawn_reaper(manager: Arc<SessionManager>, shutdown: CancellationToken) -> JoinHandle<()> {
    let interval = manager.config().reap_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let expired = manager.expired_ids();
            if expired.is_empty() {
                continue;
            }
            info!(count = expired.len(), "reaping expired sessions");
            for id in expired {
                manager.destroy_session(&id).await;
            }
        }
    })
}
