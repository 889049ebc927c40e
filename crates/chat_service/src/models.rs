//! The model catalog offered to conversations.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatModel {
    pub id: String,
    pub name: String,
    /// Default system preprompt for conversations on this model.
    #[serde(default)]
    pub preprompt: String,
}

impl ChatModel {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            preprompt: String::new(),
        }
    }

    pub fn with_preprompt(mut self, preprompt: impl Into<String>) -> Self {
        self.preprompt = preprompt.into();
        self
    }
}

/// Static model list. A conversation keeps its model id forever, so a
/// model removed from the catalog makes existing conversations report
/// "model not available" rather than failing obscurely.
pub struct ModelRegistry {
    models: Vec<ChatModel>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ChatModel>) -> Self {
        Self { models }
    }

    pub fn find(&self, id: &str) -> Option<&ChatModel> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn all(&self) -> &[ChatModel] {
        &self.models
    }
}
