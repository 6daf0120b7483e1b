use crate::models::{EventId, NewOpenEvent, OpenEvent};
use anyhow::Result;
use async_trait::async_trait;

/// Persistent store of open events.
///
/// Implementations are shared by every recording task and must be safe for
/// concurrent use. No uniqueness constraint is placed on (app_name, ip).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the collection/table and its indexes:
    /// (app_name, ip), (channel_id, app_name) and created_at descending
    async fn init(&self) -> Result<()>;

    /// Count events for the pair created at or after `since` (unix seconds)
    async fn count_since(&self, app_name: &str, ip: &str, since: i64) -> Result<u64>;

    /// Insert a new event and return its store-assigned id
    async fn insert(&self, event: &NewOpenEvent) -> Result<EventId>;

    /// Most recently created event for the pair
    async fn latest(&self, app_name: &str, ip: &str) -> Result<Option<OpenEvent>>;
}
