//! Generation event protocol.
//!
//! One generation pass produces a sequence of these events. They are consumed
//! by the update sink, which mutates the message being written, records the
//! non-transient ones in the message's audit log, and forwards a projection
//! of each to the client as one JSON object per line.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status values carried by [`MessageUpdate::Status`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStatus {
    Started,
    Error,
    KeepAlive,
}

/// Sub-channel of a reasoning update.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReasoningUpdate {
    Stream,
    Status,
}

/// A single typed event emitted during a generation pass.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageUpdate {
    Status {
        status: UpdateStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(
            rename = "assistantId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        assistant_id: Option<Uuid>,
    },

    /// A content token. Appended to the message content, never audited.
    Stream { token: String },

    /// A token or status on the auxiliary reasoning channel.
    Reasoning {
        subtype: ReasoningUpdate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// Conversation title chosen by the backend.
    Title { title: String },

    /// The authoritative final text for the pass. Content becomes
    /// pass-start content + `text`, replacing whatever tokens streamed in.
    FinalAnswer { text: String, interrupted: bool },

    /// A file produced during generation, referenced by content hash.
    File { name: String, sha: String, mime: String },
}

impl MessageUpdate {
    pub fn started(message: impl Into<String>) -> Self {
        MessageUpdate::Status {
            status: UpdateStatus::Started,
            message: Some(message.into()),
            assistant_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        MessageUpdate::Status {
            status: UpdateStatus::Error,
            message: Some(message.into()),
            assistant_id: None,
        }
    }

    /// Transient events are forwarded to the client but never recorded in a
    /// message's audit log: raw stream tokens, reasoning tokens, keep-alives.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MessageUpdate::Stream { .. }
                | MessageUpdate::Reasoning {
                    subtype: ReasoningUpdate::Stream,
                    ..
                }
                | MessageUpdate::Status {
                    status: UpdateStatus::KeepAlive,
                    ..
                }
        )
    }

    /// Stamp the authoring assistant onto a status event. Other event kinds
    /// are returned unchanged.
    pub fn with_assistant(self, id: Uuid) -> Self {
        match self {
            MessageUpdate::Status {
                status, message, ..
            } => MessageUpdate::Status {
                status,
                message,
                assistant_id: Some(id),
            },
            other => other,
        }
    }
}
