// Background maintenance scheduler: periodic session expiry and permission
// cache sweeps. Tasks are spawned once at startup and log their work.

use std::time::Duration;
use tracing::{info, warn};

use crate::app::AppState;

/// Interval between maintenance passes
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Background task manager for the auth core
pub struct BackgroundTaskManager {
    state: AppState,
}

impl BackgroundTaskManager {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Start all background tasks
    pub async fn start_all_tasks(&self) {
        info!("Starting background maintenance tasks");

        let sessions = self.state.session_manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match sessions.cleanup_expired().await {
                    Ok(0) => {}
                    Ok(count) => info!("Session cleanup expired {} sessions", count),
                    Err(e) => warn!("Session cleanup failed: {}", e),
                }
            }
        });

        let permissions = self.state.permission_resolver.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let evicted = permissions.sweep_expired();
                if evicted > 0 {
                    info!("Permission cache sweep evicted {} entries", evicted);
                }
            }
        });
    }
}

/// Initialize background tasks (call this in main.rs)
pub async fn initialize_background_tasks(state: AppState) {
    let task_manager = BackgroundTaskManager::new(state);
    task_manager.start_all_tasks().await;
}
