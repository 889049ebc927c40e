//! In-memory conversation store for tests and embedded use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conversation_tree::Conversation;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::gateway::ConversationStore;

#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    usage: RwLock<HashMap<(Uuid, DateTime<Utc>), u64>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one usage counter; test observability.
    pub async fn assistant_usage(&self, assistant_id: Uuid, bucket: DateTime<Utc>) -> u64 {
        self.usage
            .read()
            .await
            .get(&(assistant_id, bucket))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn insert(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn replace_messages(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(&conversation.id)
            .ok_or(StoreError::NotFound)?;
        stored.messages = conversation.messages.clone();
        stored.root_message_id = conversation.root_message_id;
        stored.title = conversation.title.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations.get_mut(&id).ok_or(StoreError::NotFound)?;
        stored.title = title.to_string();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn update_settings(
        &self,
        id: Uuid,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = title {
            stored.title = title.to_string();
        }
        if let Some(model) = model {
            stored.model = model.to_string();
        }
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.conversations.write().await.remove(&id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.conversations.read().await.len())
    }

    async fn increment_assistant_usage(
        &self,
        assistant_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<u64> {
        let mut usage = self.usage.write().await;
        let counter = usage.entry((assistant_id, bucket)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
