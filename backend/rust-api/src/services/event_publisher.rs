use anyhow::{Context, Result};
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde_json::json;

use crate::metrics::track_cache_operation;

const COMPLETION_QUEUE_KEY: &str = "events:simulation_completed";

/// Pushes session-completion events onto a Redis list for downstream
/// consumers (points, notifications). Best-effort: callers log failures
/// and never fail the turn over it.
pub struct EventPublisher {
    redis: ConnectionManager,
}

impl EventPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn publish_simulation_completed(
        &self,
        user_id: &str,
        session_id: &str,
        overall_score: f64,
    ) -> Result<()> {
        let payload = serde_json::to_string(&json!({
            "event": "simulation_completed",
            "user_id": user_id,
            "session_id": session_id,
            "points_earned": overall_score.round() as i64,
            "occurred_at": Utc::now().to_rfc3339(),
        }))
        .context("Failed to serialize completion event")?;

        let mut conn = self.redis.clone();
        track_cache_operation("lpush", async {
            redis::cmd("LPUSH")
                .arg(COMPLETION_QUEUE_KEY)
                .arg(&payload)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to push completion event to Redis")
        })
        .await?;

        tracing::debug!("Completion event published for session {}", session_id);
        Ok(())
    }
}
