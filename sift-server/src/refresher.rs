//! Background progress-cache refresher.

use std::time::Duration;

use tracing::warn;

use sift_store::{Database, RefreshResult};

/// Spawn the periodic materialized-view refresh as a background tokio task.
pub fn spawn_refresher(db: Database, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match db.refresh_progress().await {
                Ok(RefreshResult::Refreshed { .. }) => {}
                Ok(RefreshResult::ViewMissing) => {
                    warn!("Progress view missing; run the migrations to create it");
                }
                Err(e) => warn!("Progress refresh error: {}", e),
            }
        }
    });
}
