use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::update::MessageUpdate;

/// Role of a message author.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageFrom {
    User,
    Assistant,
    System,
}

/// Streaming lifecycle of a message's content.
///
/// `Finalized` is only reachable through a final-answer event, so "was this
/// answer truncated" is an explicit property of the node rather than
/// something inferred from its text.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    #[default]
    Empty,
    Streaming,
    Finalized,
}

/// How a file attachment is carried.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// `value` is the sha256 of a blob already held by the file store.
    Hash,
    /// `value` is the inline base64-encoded payload.
    Base64,
}

/// An attachment on a message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageFile {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub name: String,
    pub value: String,
    pub mime: String,
}

/// A node in the conversation tree.
///
/// `ancestors` and `children` are redundant adjacency lists; the tree
/// primitives maintain both sides in the same call so that path-to-root
/// stays O(depth) without per-node lookups.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub id: Uuid,
    pub from: MessageFrom,
    pub content: String,

    /// Auxiliary reasoning channel, grown independently of `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Ids from the root down to this node's parent. The root has none.
    #[serde(default)]
    pub ancestors: Vec<Uuid>,

    /// Direct children, insertion-ordered. More than one child marks a
    /// branch point left behind by a retry or an edit.
    #[serde(default)]
    pub children: Vec<Uuid>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<MessageFile>,

    /// Audit log of the non-transient generation events applied to this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<MessageUpdate>,

    /// Set when generation ended without a clean finish.
    #[serde(default)]
    pub interrupted: bool,

    #[serde(
        rename = "assistantId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assistant_id: Option<Uuid>,

    /// User feedback: -1, 0 or 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i8>,

    #[serde(default)]
    pub state: MessageState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(from: MessageFrom, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            from,
            content: content.into(),
            reasoning: None,
            ancestors: Vec::new(),
            children: Vec::new(),
            files: Vec::new(),
            updates: Vec::new(),
            interrupted: false,
            assistant_id: None,
            score: None,
            state: MessageState::Empty,
            created_at: now,
            updated_at: now,
        }
    }

    /// An empty assistant placeholder, to be filled by a generation pass.
    pub fn placeholder() -> Self {
        Self::new(MessageFrom::Assistant, "")
    }

    pub fn with_files(mut self, files: Vec<MessageFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_assistant(mut self, assistant_id: Uuid) -> Self {
        self.assistant_id = Some(assistant_id);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
