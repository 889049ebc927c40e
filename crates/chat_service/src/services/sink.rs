//! The update sink: one generation pass's event consumer.
//!
//! The sink is a state reducer plus a side-channel emitter. Each event
//! mutates the message being written, lands in the message's audit log
//! unless it is transient, and is forwarded to the client as one JSON line.
//! Forwarded stream tokens are length-padded so packet sizes do not leak
//! what the model is saying.

use bytes::Bytes;
use conversation_store::ConversationStore;
use conversation_tree::{
    Conversation, FileKind, MessageFile, MessageState, MessageUpdate, ReasoningUpdate,
    UpdateStatus,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Minimum forwarded length of a stream token, in characters.
pub const STREAM_TOKEN_PAD: usize = 16;

/// Size of the whitespace burst appended after a final answer, to flush
/// intermediaries that buffer small response bodies.
pub const FLUSH_PADDING_BYTES: usize = 4096;

/// Right-pad a token with NUL filler up to [`STREAM_TOKEN_PAD`] characters.
/// NUL can never occur in model output, so the client strips it safely.
pub fn pad_token(token: &str) -> String {
    let len = token.chars().count();
    let mut padded = String::with_capacity(token.len() + STREAM_TOKEN_PAD.saturating_sub(len));
    padded.push_str(token);
    for _ in len..STREAM_TOKEN_PAD {
        padded.push('\0');
    }
    padded
}

fn flush_padding() -> Bytes {
    Bytes::from(" ".repeat(FLUSH_PADDING_BYTES))
}

/// Serialize an event as one newline-terminated JSON line and send it.
/// Returns false once the client is gone.
pub async fn emit_event(client: &mpsc::Sender<Bytes>, event: &MessageUpdate) -> bool {
    match serde_json::to_string(event) {
        Ok(mut line) => {
            line.push('\n');
            client.send(Bytes::from(line)).await.is_ok()
        }
        Err(error) => {
            tracing::error!(error = %error, "failed to serialize update event");
            true
        }
    }
}

pub struct UpdateSink<'a> {
    conversation: &'a mut Conversation,
    store: &'a dyn ConversationStore,
    client: &'a mpsc::Sender<Bytes>,
    message_id: Uuid,
    assistant_id: Option<Uuid>,
    /// Title events only take effect on the first pass of a turn.
    allow_title: bool,
    /// Content at pass start; a final answer replaces everything streamed
    /// after this boundary, which is how a continue stays recoverable.
    pass_start_content: String,
    error_reported: bool,
    client_gone: bool,
}

impl<'a> UpdateSink<'a> {
    pub fn new(
        conversation: &'a mut Conversation,
        message_id: Uuid,
        assistant_id: Option<Uuid>,
        allow_title: bool,
        store: &'a dyn ConversationStore,
        client: &'a mpsc::Sender<Bytes>,
    ) -> Self {
        let pass_start_content = conversation
            .messages
            .get(&message_id)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Self {
            conversation,
            store,
            client,
            message_id,
            assistant_id,
            allow_title,
            pass_start_content,
            error_reported: false,
            client_gone: false,
        }
    }

    /// Apply one event: reduce it into the message, audit it, forward it.
    pub async fn apply(&mut self, event: MessageUpdate) {
        let event = match self.assistant_id {
            Some(id) => event.with_assistant(id),
            None => event,
        };

        match &event {
            MessageUpdate::Stream { token } => {
                if let Some(message) = self.conversation.messages.get_mut(&self.message_id) {
                    message.content.push_str(token);
                    if message.state == MessageState::Empty {
                        message.state = MessageState::Streaming;
                    }
                }
            }
            MessageUpdate::Reasoning {
                subtype: ReasoningUpdate::Stream,
                token: Some(token),
                ..
            } => {
                if let Some(message) = self.conversation.messages.get_mut(&self.message_id) {
                    message
                        .reasoning
                        .get_or_insert_with(String::new)
                        .push_str(token);
                }
            }
            MessageUpdate::Title { title } => {
                if self.allow_title {
                    self.conversation.title = title.clone();
                    // Partial checkpoint: the title must reach the client
                    // before the turn finishes.
                    if let Err(error) = self.store.update_title(self.conversation.id, title).await
                    {
                        tracing::warn!(
                            conversation_id = %self.conversation.id,
                            error = %error,
                            "failed to persist title checkpoint"
                        );
                    }
                }
            }
            MessageUpdate::FinalAnswer { text, interrupted } => {
                if let Some(message) = self.conversation.messages.get_mut(&self.message_id) {
                    message.interrupted = *interrupted;
                    message.content = format!("{}{}", self.pass_start_content, text);
                    message.state = MessageState::Finalized;
                }
            }
            MessageUpdate::File { name, sha, mime } => {
                if let Some(message) = self.conversation.messages.get_mut(&self.message_id) {
                    message.files.push(MessageFile {
                        kind: FileKind::Hash,
                        name: name.clone(),
                        value: sha.clone(),
                        mime: mime.clone(),
                    });
                }
            }
            MessageUpdate::Status {
                status: UpdateStatus::Error,
                ..
            } => {
                self.error_reported = true;
            }
            _ => {}
        }

        if !event.is_transient() {
            if let Some(message) = self.conversation.messages.get_mut(&self.message_id) {
                message.updates.push(event.clone());
            }
        }

        let projection = match &event {
            MessageUpdate::Stream { token } => MessageUpdate::Stream {
                token: pad_token(token),
            },
            other => other.clone(),
        };
        self.send_event(&projection).await;

        if matches!(event, MessageUpdate::FinalAnswer { .. }) {
            self.send_raw(flush_padding()).await;
        }
    }

    /// Forward an event to the client without reducing or auditing it.
    /// Used for turn-level signals like the per-assistant start banner.
    pub async fn forward_only(&mut self, event: MessageUpdate) {
        self.send_event(&event).await;
    }

    pub fn error_reported(&self) -> bool {
        self.error_reported
    }

    /// Whether the pass produced any content beyond what it started with.
    pub fn content_changed(&self) -> bool {
        self.conversation
            .messages
            .get(&self.message_id)
            .map(|m| m.content != self.pass_start_content)
            .unwrap_or(false)
    }

    async fn send_event(&mut self, event: &MessageUpdate) {
        if self.client_gone {
            return;
        }
        if !emit_event(self.client, event).await {
            self.client_gone = true;
            tracing::debug!(
                conversation_id = %self.conversation.id,
                "client disconnected, continuing pass without forwarding"
            );
        }
    }

    async fn send_raw(&mut self, bytes: Bytes) {
        if self.client_gone {
            return;
        }
        if self.client.send(bytes).await.is_err() {
            self.client_gone = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conversation_store::MemoryConversationStore;
    use conversation_tree::{Message, MessageFrom};

    struct Fixture {
        conversation: Conversation,
        target: Uuid,
        store: MemoryConversationStore,
    }

    fn fixture() -> Fixture {
        let mut conversation = Conversation::new("test-model", "");
        let root_id = conversation.root_message_id.unwrap();
        let user = conversation
            .insert_as_child(Message::new(MessageFrom::User, "Hello"), Some(root_id))
            .unwrap();
        let target = conversation
            .insert_as_child(Message::placeholder(), Some(user))
            .unwrap();
        Fixture {
            conversation,
            target,
            store: MemoryConversationStore::new(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            lines.push(String::from_utf8(bytes.to_vec()).unwrap());
        }
        lines
    }

    #[test]
    fn pad_token_reaches_the_minimum_length() {
        assert_eq!(pad_token("He").chars().count(), STREAM_TOKEN_PAD);
        assert!(pad_token("He").starts_with("He"));
        let long = "a".repeat(STREAM_TOKEN_PAD + 5);
        assert_eq!(pad_token(&long), long);
    }

    #[tokio::test]
    async fn stream_tokens_accumulate_and_are_padded_on_the_wire() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        for token in ["He", "llo"] {
            sink.apply(MessageUpdate::Stream {
                token: token.to_string(),
            })
            .await;
        }
        assert!(sink.content_changed());
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        assert_eq!(message.content, "Hello");
        assert_eq!(message.state, MessageState::Streaming);
        // Raw tokens are not audited.
        assert!(message.updates.is_empty());

        for line in drain(&mut rx) {
            let event: MessageUpdate = serde_json::from_str(line.trim_end()).unwrap();
            match event {
                MessageUpdate::Stream { token } => {
                    assert!(token.chars().count() >= STREAM_TOKEN_PAD);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn final_answer_replaces_streamed_content_from_the_pass_boundary() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::FinalAnswer {
            text: "Hi!".to_string(),
            interrupted: false,
        })
        .await;
        sink.apply(MessageUpdate::FinalAnswer {
            text: "Hi! there".to_string(),
            interrupted: false,
        })
        .await;
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        // The second answer replaces from the pass boundary, not appends.
        assert_eq!(message.content, "Hi! there");
        assert_eq!(message.state, MessageState::Finalized);
        assert_eq!(message.updates.len(), 2);

        // Each final answer is followed by the anti-buffering burst.
        let lines = drain(&mut rx);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].len(), FLUSH_PADDING_BYTES);
        assert!(lines[1].chars().all(|c| c == ' '));
    }

    #[tokio::test]
    async fn continue_semantics_keep_the_old_content_as_the_boundary() {
        let mut fx = fixture();
        {
            let message = fx.conversation.messages.get_mut(&fx.target).unwrap();
            message.content = "First half".to_string();
        }
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::Stream {
            token: ", second half".to_string(),
        })
        .await;
        sink.apply(MessageUpdate::FinalAnswer {
            text: ", second half".to_string(),
            interrupted: false,
        })
        .await;
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        assert_eq!(message.content, "First half, second half");
    }

    #[tokio::test]
    async fn reasoning_streams_into_its_own_channel() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::Reasoning {
            subtype: ReasoningUpdate::Stream,
            token: Some("thinking...".to_string()),
            status: None,
        })
        .await;
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        assert_eq!(message.reasoning.as_deref(), Some("thinking..."));
        assert!(message.content.is_empty());
        assert!(message.updates.is_empty());
    }

    #[tokio::test]
    async fn title_event_updates_and_checkpoints_the_title() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let conversation_id = fx.conversation.id;
        let (tx, _rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::Title {
            title: "Greetings".to_string(),
        })
        .await;
        drop(sink);

        assert_eq!(fx.conversation.title, "Greetings");
        let stored = fx.store.load(conversation_id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Greetings");
    }

    #[tokio::test]
    async fn title_event_is_ignored_after_the_first_pass() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            false,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::Title {
            title: "Hijacked".to_string(),
        })
        .await;
        drop(sink);

        assert_eq!(fx.conversation.title, "New Chat");
    }

    #[tokio::test]
    async fn file_events_append_hash_references() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, _rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::File {
            name: "plot.png".to_string(),
            sha: "cafe".to_string(),
            mime: "image/png".to_string(),
        })
        .await;
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        assert_eq!(message.files.len(), 1);
        assert_eq!(message.files[0].kind, FileKind::Hash);
        assert_eq!(message.files[0].value, "cafe");
        assert_eq!(message.updates.len(), 1);
    }

    #[tokio::test]
    async fn keepalives_are_forwarded_but_never_audited() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            None,
            true,
            &fx.store,
            &tx,
        );
        sink.apply(MessageUpdate::Status {
            status: UpdateStatus::KeepAlive,
            message: None,
            assistant_id: None,
        })
        .await;
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        assert!(message.updates.is_empty());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn error_status_is_audited_and_flagged() {
        let mut fx = fixture();
        fx.store.insert(&fx.conversation).await.unwrap();
        let assistant_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(16);

        let mut sink = UpdateSink::new(
            &mut fx.conversation,
            fx.target,
            Some(assistant_id),
            true,
            &fx.store,
            &tx,
        );
        assert!(!sink.error_reported());
        sink.apply(MessageUpdate::error("backend exploded")).await;
        assert!(sink.error_reported());
        assert!(!sink.content_changed());
        drop(sink);

        let message = fx.conversation.messages.get(&fx.target).unwrap();
        match &message.updates[0] {
            MessageUpdate::Status {
                status: UpdateStatus::Error,
                assistant_id: stamped,
                ..
            } => assert_eq!(*stamped, Some(assistant_id)),
            other => panic!("unexpected audit entry: {other:?}"),
        }
    }
}
