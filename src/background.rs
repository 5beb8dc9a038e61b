//! 过期会话的定期清理。

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SESSION_PRUNE_INTERVAL_SECS;
use crate::db::SharedSessionStore;

/// 启动会话清理任务。
pub fn spawn_background_tasks(sessions: SharedSessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match sessions.prune_sessions(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "pruned expired sessions"),
                Err(err) => warn!(error = %err, "session prune failed"),
            }
        }
    });
}
