//! Non-blocking audit trail.
//!
//! Engines push events onto a bounded channel after their transaction commits;
//! a background writer drains it into `system_activities`. A full or closed
//! queue drops the event with a warning and the caller never sees an error.

use crate::models::ActivityEvent;
use crate::services::metrics::record_activity_event;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone)]
pub struct ActivityLog {
    sender: mpsc::Sender<ActivityEvent>,
}

impl ActivityLog {
    /// Creates the log and the receiving half for a writer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ActivityEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Creates the log and spawns the writer that persists events to `pool`.
    pub fn spawn(pool: PgPool, capacity: usize) -> (Self, JoinHandle<()>) {
        let (log, receiver) = Self::channel(capacity);
        let handle = tokio::spawn(run_writer(pool, receiver));
        (log, handle)
    }

    pub fn record(&self, event: ActivityEvent) {
        match self.sender.try_send(event) {
            Ok(()) => record_activity_event("queued"),
            Err(mpsc::error::TrySendError::Full(event)) => {
                record_activity_event("dropped");
                tracing::warn!(
                    activity_type = event.activity_type.as_str(),
                    "Activity queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                record_activity_event("dropped");
                tracing::warn!(
                    activity_type = event.activity_type.as_str(),
                    "Activity writer stopped, dropping event"
                );
            }
        }
    }
}

async fn run_writer(pool: PgPool, mut receiver: mpsc::Receiver<ActivityEvent>) {
    tracing::info!("Activity writer started");

    while let Some(event) = receiver.recv().await {
        let result = sqlx::query(
            r#"
            INSERT INTO system_activities (activity_id, activity_type, description, actor_id, target_id, target_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.activity_type.as_str())
        .bind(&event.description)
        .bind(event.actor_id)
        .bind(event.target_id)
        .bind(event.target_type)
        .execute(&pool)
        .await;

        match result {
            Ok(_) => record_activity_event("written"),
            Err(e) => {
                record_activity_event("failed");
                tracing::warn!(
                    error = %e,
                    activity_type = event.activity_type.as_str(),
                    "Failed to persist activity"
                );
            }
        }
    }

    tracing::info!("Activity writer stopped");
}
