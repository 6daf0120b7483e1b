//! Deduplicated recording of open events
//!
//! Each call checks the store for an event with the same app name and IP
//! inside the rolling window and inserts only when there is none. The check
//! and the insert are separate round-trips, so two concurrent requests for
//! the same pair can both insert; the store has no unique constraint on the
//! pair. Exact dedup would need a unique key on (app_name, ip, time bucket)
//! with an upsert, or a per-key lock around check and insert.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::models::{EventId, NewOpenEvent};
use crate::storage::Storage;

/// Result of a single recording attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new event was stored
    Inserted(EventId),
    /// The pair already has `recent` events inside the window
    Skipped { recent: u64 },
    /// Dedup check or insert failed; nothing was retried
    Failed(String),
}

pub struct EventRecorder {
    storage: Arc<dyn Storage>,
    window_secs: i64,
}

impl EventRecorder {
    pub fn new(storage: Arc<dyn Storage>, window_secs: i64) -> Self {
        Self {
            storage,
            window_secs,
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// Check-then-insert. The window ends at the wall-clock time of the
    /// check, not at the event's own `created_at`.
    pub async fn record(&self, event: &NewOpenEvent) -> RecordOutcome {
        let since = Utc::now().timestamp() - self.window_secs;

        let recent = match self
            .storage
            .count_since(&event.app_name, &event.ip, since)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!(
                    app_name = %event.app_name,
                    ip = %event.ip,
                    error = %e,
                    "Failed to check recent open events"
                );
                return RecordOutcome::Failed(e.to_string());
            }
        };

        if recent > 0 {
            info!(
                app_name = %event.app_name,
                ip = %event.ip,
                recent,
                "Open event already recorded within window, skipping"
            );
            return RecordOutcome::Skipped { recent };
        }

        match self.storage.insert(event).await {
            Ok(id) => {
                info!(
                    id = %id,
                    channel_id = %event.channel_id,
                    app_name = %event.app_name,
                    ip = %event.ip,
                    "Recorded open event"
                );
                RecordOutcome::Inserted(id)
            }
            Err(e) => {
                error!(
                    app_name = %event.app_name,
                    ip = %event.ip,
                    error = %e,
                    "Failed to insert open event"
                );
                RecordOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run [`record`](Self::record) on its own task.
    ///
    /// Callers on the request path drop the handle; the task is abandoned if
    /// the process exits first.
    pub fn spawn(self: &Arc<Self>, event: NewOpenEvent) -> JoinHandle<RecordOutcome> {
        let recorder = Arc::clone(self);
        tokio::spawn(async move { recorder.record(&event).await })
    }
}
