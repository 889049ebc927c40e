//! The turn orchestrator.
//!
//! One turn = one client request: precondition checks, at most one tree
//! mutation, then one generation pass per bound assistant. Passes run
//! strictly sequentially; when several assistants are bound, each pass's
//! placeholder is grafted as a child of the previous pass's message so the
//! turn reads as a chain, not a fan-out.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use conversation_store::{hour_bucket, ConversationStore, StoreError};
use conversation_tree::{Conversation, Message, MessageFrom, MessageUpdate, TreeError};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::assistants::AssistantRegistry;
use crate::config::UsageLimits;
use crate::dto::TurnRequestBody;
use crate::error::{AppError, Result};
use crate::files::{resolve_input_files, FileStore};
use crate::generation::{GenerationBackend, GenerationContext};
use crate::models::ModelRegistry;
use crate::rate_limit::MessageEventLog;
use crate::services::sink::{emit_event, UpdateSink};

/// A turn whose preconditions passed and whose tree mutation is already
/// persisted. From here on, all failures are reported in-band.
#[derive(Debug)]
pub struct PreparedTurn {
    conversation: Conversation,
    target_id: Uuid,
    prompt: Vec<Message>,
    assistant_ids: Vec<Uuid>,
    is_continue: bool,
    prompted_at: DateTime<Utc>,
}

impl PreparedTurn {
    pub fn target_id(&self) -> Uuid {
        self.target_id
    }

    pub fn prompt(&self) -> &[Message] {
        &self.prompt
    }
}

pub struct TurnOrchestrator {
    store: Arc<dyn ConversationStore>,
    backend: Arc<dyn GenerationBackend>,
    assistants: Arc<AssistantRegistry>,
    files: Arc<dyn FileStore>,
    events: Arc<MessageEventLog>,
    models: Arc<ModelRegistry>,
    limits: UsageLimits,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn GenerationBackend>,
        assistants: Arc<AssistantRegistry>,
        files: Arc<dyn FileStore>,
        events: Arc<MessageEventLog>,
        models: Arc<ModelRegistry>,
        limits: UsageLimits,
    ) -> Self {
        Self {
            store,
            backend,
            assistants,
            files,
            events,
            models,
            limits,
        }
    }

    /// Run every precondition check and apply the turn's tree mutation.
    ///
    /// Failures here surface as a single synchronous error before any
    /// stream is started. On success the mutated tree is already durable:
    /// a placeholder is never lost to a later generation failure.
    pub async fn prepare(
        &self,
        conversation_id: Uuid,
        client_key: &str,
        body: TurnRequestBody,
    ) -> Result<PreparedTurn> {
        let mut conversation = self
            .store
            .load(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if conversation.convert_legacy() {
            self.store
                .replace_messages(&conversation)
                .await
                .map_err(|e| {
                    AppError::Persistence(format!("failed to convert conversation: {e}"))
                })?;
        }

        // Every turn is recorded; the limit check only applies when set.
        let recent = self
            .events
            .record_and_count(client_key, Duration::minutes(1));
        if let Some(limit) = self.limits.messages_per_minute {
            if recent > limit as usize {
                return Err(AppError::RateLimited(
                    "Too many messages. Try again later.".to_string(),
                ));
            }
        }
        if let Some(max) = self.limits.max_messages {
            if conversation.messages.len() > max {
                return Err(AppError::RateLimited(format!(
                    "This conversation has more than {max} messages. Start a new one to continue"
                )));
            }
        }

        let prompt_text = body.inputs.as_deref().map(|s| s.replace("\r\n", "\n"));
        if let (Some(max), Some(text)) = (self.limits.max_message_length, prompt_text.as_deref())
        {
            if text.chars().count() > max {
                return Err(AppError::BadRequest("Message too long.".to_string()));
            }
        }

        if !self.models.contains(&conversation.model) {
            return Err(AppError::ModelNotAvailable);
        }

        let uploaded = resolve_input_files(
            self.files.as_ref(),
            conversation.id,
            &body.files,
            &self.limits,
        )
        .await?;

        let (target_id, prompt) = if body.is_continue {
            let message_id = body
                .id
                .ok_or_else(|| AppError::BadRequest("Continue requires a message id".to_string()))?;
            let target = conversation
                .messages
                .get(&message_id)
                .ok_or(TreeError::NotFound(message_id))?;
            if !target.is_leaf() {
                return Err(AppError::InvalidOperation(
                    "Can only continue the last message".to_string(),
                ));
            }
            // No new node: generation appends onto the target itself.
            (message_id, conversation.build_subtree(message_id)?)
        } else if body.is_retry {
            let message_id = body
                .id
                .ok_or_else(|| AppError::BadRequest("Retry requires a message id".to_string()))?;
            let target = conversation
                .messages
                .get(&message_id)
                .ok_or(TreeError::NotFound(message_id))?;

            match (target.from, prompt_text.as_ref()) {
                (MessageFrom::User, Some(text)) => {
                    // Editing a user message: a sibling branch carries the
                    // new text, with a fresh placeholder beneath it.
                    let new_user = conversation.insert_as_sibling(
                        Message::new(MessageFrom::User, text.clone())
                            .with_files(uploaded.clone()),
                        message_id,
                    )?;
                    let placeholder =
                        conversation.insert_as_child(Message::placeholder(), Some(new_user))?;
                    (placeholder, conversation.build_subtree(new_user)?)
                }
                (MessageFrom::Assistant, _) => {
                    // Regenerating an answer: sibling placeholder, same
                    // prompt context minus the answer being retried.
                    let placeholder =
                        conversation.insert_as_sibling(Message::placeholder(), message_id)?;
                    let mut prompt = conversation.build_subtree(message_id)?;
                    prompt.pop();
                    (placeholder, prompt)
                }
                (MessageFrom::User, None) => {
                    return Err(AppError::InvalidOperation(
                        "Retrying a user message requires replacement text".to_string(),
                    ));
                }
                (MessageFrom::System, _) => {
                    return Err(AppError::InvalidOperation(
                        "Cannot retry a system message".to_string(),
                    ));
                }
            }
        } else {
            // A plain new message: user node and blank assistant node,
            // back to back, under the given parent or the latest leaf.
            let new_user = conversation.insert_as_child(
                Message::new(MessageFrom::User, prompt_text.clone().unwrap_or_default())
                    .with_files(uploaded.clone()),
                body.id,
            )?;
            let placeholder =
                conversation.insert_as_child(Message::placeholder(), Some(new_user))?;
            (placeholder, conversation.build_subtree(new_user)?)
        };

        if prompt.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "failed to build prompt"
            )));
        }

        // Commit checkpoint: the new tree shape must be durable before any
        // generation starts.
        self.store
            .replace_messages(&conversation)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;

        tracing::info!(
            conversation_id = %conversation.id,
            target_id = %target_id,
            prompt_len = prompt.len(),
            is_retry = body.is_retry,
            is_continue = body.is_continue,
            "turn prepared"
        );

        Ok(PreparedTurn {
            assistant_ids: conversation.effective_assistant_ids(),
            conversation,
            target_id,
            prompt,
            is_continue: body.is_continue,
            prompted_at: Utc::now(),
        })
    }

    /// Drive the generation passes for a prepared turn, streaming events to
    /// `client`. Always runs to completion; failures after this point are
    /// reported in-band and never tear down the stream. Returns whether the
    /// terminal persistence write succeeded.
    pub async fn run(&self, prepared: PreparedTurn, client: mpsc::Sender<Bytes>) -> bool {
        let PreparedTurn {
            mut conversation,
            target_id,
            prompt,
            assistant_ids,
            is_continue,
            prompted_at,
        } = prepared;

        let conversation_id = conversation.id;
        let model = conversation.model.clone();
        let multi_assistant = assistant_ids.len() > 1;
        let passes: Vec<Option<Uuid>> = if assistant_ids.is_empty() {
            vec![None]
        } else {
            assistant_ids.into_iter().map(Some).collect()
        };

        let mut write_target = target_id;
        let mut pass_prompt = prompt;

        for (index, assistant_id) in passes.into_iter().enumerate() {
            if index > 0 {
                // Chain: this pass's placeholder hangs off the previous
                // pass's message, so later assistants see earlier answers.
                let mut placeholder = Message::placeholder();
                if let Some(id) = assistant_id {
                    placeholder = placeholder.with_assistant(id);
                }
                match conversation.insert_as_child(placeholder, Some(write_target)) {
                    Ok(id) => {
                        write_target = id;
                        match conversation.build_subtree(id) {
                            Ok(mut rebuilt) => {
                                rebuilt.pop();
                                pass_prompt = rebuilt;
                            }
                            Err(error) => {
                                tracing::error!(
                                    conversation_id = %conversation_id,
                                    error = %error,
                                    "failed to rebuild prompt for chained pass"
                                );
                                break;
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            conversation_id = %conversation_id,
                            error = %error,
                            "failed to graft chained placeholder"
                        );
                        break;
                    }
                }
            } else if let (Some(id), Some(message)) = (
                assistant_id,
                conversation.messages.get_mut(&write_target),
            ) {
                message.assistant_id = Some(id);
            }

            let assistant = match assistant_id {
                Some(id) => self.assistants.get(id).await,
                None => None,
            };

            let mut messages = pass_prompt.clone();
            if let Some(assistant) = &assistant {
                // The assistant's persona rides in a local copy of the
                // prompt's system message, never in the tree.
                if multi_assistant || !assistant.preprompt.is_empty() {
                    substitute_preprompt(&mut messages, &assistant.preprompt);
                }
            }
            let ctx = GenerationContext {
                conversation_id,
                model: model.clone(),
                messages,
                assistant: assistant.clone(),
                is_continue,
                prompted_at,
            };

            let mut sink = UpdateSink::new(
                &mut conversation,
                write_target,
                assistant_id,
                index == 0,
                self.store.as_ref(),
                &client,
            );

            if multi_assistant {
                let name = assistant
                    .as_ref()
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| "Assistant".to_string());
                let mut banner = MessageUpdate::started(format!("{name} is responding..."));
                if let Some(id) = assistant_id {
                    banner = banner.with_assistant(id);
                }
                sink.forward_only(banner).await;
            }

            if assistant_id.is_some() && assistant.is_none() {
                // Fault isolation: a missing assistant fails its own pass
                // only; later passes still run.
                sink.apply(MessageUpdate::error("Assistant not found."))
                    .await;
            } else {
                match self.backend.generate(ctx).await {
                    Ok(mut stream) => {
                        while let Some(item) = stream.next().await {
                            match item {
                                Ok(event) => sink.apply(event).await,
                                Err(error) => {
                                    tracing::error!(
                                        conversation_id = %conversation_id,
                                        error = %error,
                                        "generation failed mid-stream"
                                    );
                                    sink.apply(MessageUpdate::error(error.to_string())).await;
                                    break;
                                }
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            conversation_id = %conversation_id,
                            error = %error,
                            "generation failed to start"
                        );
                        sink.apply(MessageUpdate::error(error.to_string())).await;
                    }
                }
            }

            // The client must never hang on silence: an unchanged message
            // with no reported error gets a synthesized error event.
            if !sink.error_reported() && !sink.content_changed() {
                sink.apply(MessageUpdate::error(
                    "No output was generated. Something went wrong.",
                ))
                .await;
            }
            drop(sink);

            if let Some(message) = conversation.messages.get_mut(&write_target) {
                message.updated_at = Utc::now();
            }

            if let Err(error) = self.persist_with_retry(&conversation).await {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "checkpoint write failed after assistant pass"
                );
            }

            if let Some(id) = assistant_id {
                if let Err(error) = self
                    .store
                    .increment_assistant_usage(id, hour_bucket(Utc::now()))
                    .await
                {
                    tracing::warn!(
                        assistant_id = %id,
                        error = %error,
                        "failed to bump assistant usage counter"
                    );
                }
            }
        }

        // Terminal checkpoint. Only after this write is the turn complete;
        // a disconnect before it leaves the message interrupted/streaming,
        // never disguised as a finished answer.
        match self.persist_with_retry(&conversation).await {
            Ok(()) => {
                tracing::info!(conversation_id = %conversation_id, "turn completed");
                true
            }
            Err(error) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "terminal persistence failed"
                );
                emit_event(
                    &client,
                    &MessageUpdate::error("Failed to save the conversation."),
                )
                .await;
                false
            }
        }
    }

    async fn persist_with_retry(
        &self,
        conversation: &Conversation,
    ) -> std::result::Result<(), StoreError> {
        if let Err(first) = self.store.replace_messages(conversation).await {
            tracing::warn!(
                conversation_id = %conversation.id,
                error = %first,
                "checkpoint write failed, retrying once"
            );
            self.store.replace_messages(conversation).await?;
        }
        Ok(())
    }
}

fn substitute_preprompt(messages: &mut [Message], preprompt: &str) {
    if let Some(first) = messages.first_mut() {
        if first.from == MessageFrom::System {
            first.content = preprompt.to_string();
        }
    }
}
