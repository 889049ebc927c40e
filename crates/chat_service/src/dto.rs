//! Request and response shapes for the HTTP surface.

use std::collections::HashMap;

use conversation_tree::{Conversation, FileKind, Message};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assistants::Assistant;

/// Body of the turn endpoint.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct TurnRequestBody {
    /// Parent message id for a fresh message, or the target message id for
    /// a retry/continue.
    pub id: Option<Uuid>,
    /// New prompt text.
    pub inputs: Option<String>,
    #[serde(default)]
    pub is_retry: bool,
    #[serde(default)]
    pub is_continue: bool,
    #[serde(default)]
    pub files: Vec<FileInput>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileInput {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub name: String,
    pub value: String,
    pub mime: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateConversationRequest {
    pub model: String,
    pub preprompt: Option<String>,
    #[serde(rename = "assistantId")]
    pub assistant_id: Option<Uuid>,
    #[serde(rename = "assistantIds")]
    pub assistant_ids: Option<Vec<Uuid>>,
}

#[derive(Serialize, Debug)]
pub struct CreateConversationResponse {
    #[serde(rename = "conversationId")]
    pub conversation_id: Uuid,
}

#[derive(Deserialize, Debug, Default)]
pub struct PatchConversationRequest {
    pub title: Option<String>,
    pub model: Option<String>,
}

/// Projection of a conversation returned by the load endpoint.
#[derive(Serialize, Debug)]
pub struct ConversationView {
    pub id: Uuid,
    pub title: String,
    pub model: String,
    pub preprompt: String,
    #[serde(rename = "rootMessageId")]
    pub root_message_id: Option<Uuid>,
    pub messages: HashMap<Uuid, Message>,
    pub assistants: Vec<Assistant>,
}

impl ConversationView {
    pub fn from_conversation(conversation: &Conversation, assistants: Vec<Assistant>) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title.clone(),
            model: conversation.model.clone(),
            preprompt: conversation.preprompt.clone(),
            root_message_id: conversation.root_message_id,
            messages: conversation
                .messages
                .values()
                .map(|m| (m.id, m.clone()))
                .collect(),
            assistants,
        }
    }
}
