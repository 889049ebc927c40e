use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::message::{Message, MessageFrom};

/// The single source of truth for all message data in a conversation,
/// keyed by id for O(1) lookup.
///
/// Older documents stored messages as a flat ordered array with no tree
/// fields; deserialization accepts both shapes and records the array order
/// so the legacy converter can chain the nodes. Converted pools serialize
/// as a map.
#[derive(Clone, Debug, Default)]
pub struct MessagePool {
    nodes: HashMap<Uuid, Message>,
    legacy_order: Vec<Uuid>,
}

impl MessagePool {
    pub fn get(&self, id: &Uuid) -> Option<&Message> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Message> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.nodes.contains_key(id)
    }

    /// Insert a message under its own id. Ids are unique by construction
    /// (v4), so an existing entry is only replaced when the same message is
    /// re-inserted.
    pub fn insert(&mut self, message: Message) {
        self.nodes.insert(message.id, message);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Message> {
        self.nodes.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.nodes.values_mut()
    }

    /// Linear order carried by a legacy flat-array document. Empty once the
    /// conversation has been converted to tree form.
    pub fn legacy_order(&self) -> &[Uuid] {
        &self.legacy_order
    }

    pub(crate) fn clear_legacy_order(&mut self) {
        self.legacy_order.clear();
    }
}

impl Serialize for MessagePool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.nodes.serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PoolRepr {
    Tree(HashMap<Uuid, Message>),
    Legacy(Vec<Message>),
}

impl<'de> Deserialize<'de> for MessagePool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match PoolRepr::deserialize(deserializer)? {
            PoolRepr::Tree(nodes) => Ok(Self {
                nodes,
                legacy_order: Vec::new(),
            }),
            PoolRepr::Legacy(list) => {
                let legacy_order = list.iter().map(|m| m.id).collect();
                let nodes = list.into_iter().map(|m| (m.id, m)).collect();
                Ok(Self {
                    nodes,
                    legacy_order,
                })
            }
        }
    }
}

/// A complete conversation: the message tree plus its settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub model: String,

    #[serde(default)]
    pub preprompt: String,

    /// Absent on legacy documents that have not been converted yet.
    #[serde(
        rename = "rootMessageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub root_message_id: Option<Uuid>,

    #[serde(default)]
    pub messages: MessagePool,

    #[serde(
        rename = "assistantIds",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub assistant_ids: Vec<Uuid>,

    /// Legacy single-assistant field, kept readable for older documents.
    #[serde(
        rename = "assistantId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assistant_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation seeded with a `system` root message carrying
    /// the preprompt.
    pub fn new(model: impl Into<String>, preprompt: impl Into<String>) -> Self {
        let preprompt = preprompt.into();
        let root = Message::new(MessageFrom::System, preprompt.clone());
        let root_id = root.id;
        let mut messages = MessagePool::default();
        messages.insert(root);

        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: "New Chat".to_string(),
            model: model.into(),
            preprompt,
            root_message_id: Some(root_id),
            messages,
            assistant_ids: Vec::new(),
            assistant_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Assistants bound to this conversation, folding the legacy
    /// single-assistant field into the list form.
    pub fn effective_assistant_ids(&self) -> Vec<Uuid> {
        if !self.assistant_ids.is_empty() {
            self.assistant_ids.clone()
        } else {
            self.assistant_id.into_iter().collect()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
