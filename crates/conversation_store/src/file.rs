//! File-backed conversation store: one JSON document per conversation,
//! plus a usage ledger for assistant counters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conversation_tree::Conversation;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::gateway::ConversationStore;

pub struct FileConversationStore {
    base_path: PathBuf,
    /// Serializes read-modify-write cycles on documents and on the usage
    /// ledger within this process.
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn conversations_dir(&self) -> PathBuf {
        self.base_path.join("conversations")
    }

    fn conversation_path(&self, id: Uuid) -> PathBuf {
        self.conversations_dir().join(format!("{id}.json"))
    }

    fn usage_path(&self) -> PathBuf {
        self.base_path.join("usage.json")
    }

    async fn read_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let path = self.conversation_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).await?;
        let conversation = serde_json::from_str(&contents)?;
        Ok(Some(conversation))
    }

    async fn write_conversation(&self, conversation: &Conversation) -> Result<()> {
        fs::create_dir_all(self.conversations_dir()).await?;
        let contents = serde_json::to_string_pretty(conversation)?;
        fs::write(self.conversation_path(conversation.id), contents).await?;
        Ok(())
    }

    async fn read_usage(&self) -> Result<HashMap<String, u64>> {
        let path = self.usage_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&path).await?;
        let usage = serde_json::from_str(&contents)?;
        Ok(usage)
    }

    fn usage_key(assistant_id: Uuid, bucket: DateTime<Utc>) -> String {
        format!("{assistant_id}:{}", bucket.to_rfc3339())
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.read_conversation(id).await
    }

    async fn insert(&self, conversation: &Conversation) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_conversation(conversation).await
    }

    async fn replace_messages(&self, conversation: &Conversation) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self
            .read_conversation(conversation.id)
            .await?
            .ok_or(StoreError::NotFound)?;

        stored.messages = conversation.messages.clone();
        stored.root_message_id = conversation.root_message_id;
        stored.title = conversation.title.clone();
        stored.updated_at = Utc::now();
        self.write_conversation(&stored).await
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.read_conversation(id).await?.ok_or(StoreError::NotFound)?;
        stored.title = title.to_string();
        stored.updated_at = Utc::now();
        self.write_conversation(&stored).await
    }

    async fn update_settings(
        &self,
        id: Uuid,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.read_conversation(id).await?.ok_or(StoreError::NotFound)?;
        if let Some(title) = title {
            stored.title = title.to_string();
        }
        if let Some(model) = model {
            stored.model = model.to_string();
        }
        stored.updated_at = Utc::now();
        self.write_conversation(&stored).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.conversation_path(id);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let dir = self.conversations_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut entries = fs::read_dir(&dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn increment_assistant_usage(
        &self,
        assistant_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut usage = self.read_usage().await?;
        let key = Self::usage_key(assistant_id, bucket);
        let counter = usage.entry(key).or_insert(0);
        *counter += 1;
        let value = *counter;

        fs::create_dir_all(&self.base_path).await?;
        let contents = serde_json::to_string_pretty(&usage)?;
        fs::write(self.usage_path(), contents).await?;

        tracing::debug!(
            assistant_id = %assistant_id,
            bucket = %bucket,
            count = value,
            "incremented assistant usage"
        );
        Ok(value)
    }
}
