//! The conversation store trait.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use conversation_tree::Conversation;
use uuid::Uuid;

use crate::error::Result;

/// Truncate a timestamp to the start of its hour: the bucket key for
/// assistant usage counters.
pub fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Abstract document store keyed by conversation id.
///
/// Writes are checkpoint writes: callers rely on an acknowledged return to
/// mean the document is durable, and a returned error must be surfaced (no
/// silent loss). Checkpoints happen after the tree mutation, after a title
/// change, after each assistant pass, and at turn end.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn insert(&self, conversation: &Conversation) -> Result<()>;

    /// Replace the message tree (messages + root id), the title and the
    /// updated-at stamp of an existing conversation.
    async fn replace_messages(&self, conversation: &Conversation) -> Result<()>;

    /// Persist just a title change, so the client can see it before the
    /// turn finishes.
    async fn update_title(&self, id: Uuid, title: &str) -> Result<()>;

    /// Settings update used by the PATCH endpoint.
    async fn update_settings(
        &self,
        id: Uuid,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Number of stored conversations, for the conversation-count limit.
    async fn count(&self) -> Result<usize>;

    /// Create-or-increment the hourly usage counter for an assistant.
    /// Returns the counter value after the increment.
    async fn increment_assistant_usage(
        &self,
        assistant_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hour_bucket_truncates_to_the_hour() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 13, 42, 59).unwrap();
        let bucket = hour_bucket(at);
        assert_eq!(bucket, Utc.with_ymd_and_hms(2024, 5, 17, 13, 0, 0).unwrap());
        assert_eq!(hour_bucket(bucket), bucket);
    }
}
