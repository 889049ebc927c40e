//! In-memory assistant registry.
//!
//! An assistant is a named persona with its own preprompt. During a
//! multi-assistant turn each assistant's preprompt is substituted into a
//! local copy of the prompt for its pass only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Assistant {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub preprompt: String,
}

impl Assistant {
    pub fn new(name: impl Into<String>, preprompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            preprompt: preprompt.into(),
        }
    }
}

#[derive(Default)]
pub struct AssistantRegistry {
    inner: RwLock<HashMap<Uuid, Assistant>>,
}

impl AssistantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, assistant: Assistant) -> Uuid {
        let id = assistant.id;
        self.inner.write().await.insert(id, assistant);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Assistant> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Resolve a list of ids, preserving request order. Unknown ids resolve
    /// to `None` so a caller can fault-isolate per entry.
    pub async fn get_many(&self, ids: &[Uuid]) -> Vec<(Uuid, Option<Assistant>)> {
        let inner = self.inner.read().await;
        ids.iter().map(|id| (*id, inner.get(id).cloned())).collect()
    }
}
