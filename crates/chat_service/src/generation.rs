//! The generation backend seam.
//!
//! The inference backend is a black box that turns a prompt into a stream
//! of [`MessageUpdate`] events. Everything transport- and model-specific
//! lives behind [`GenerationBackend`]; the orchestrator and sink only see
//! the event stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conversation_tree::{Message, MessageFrom, MessageUpdate};
use futures_util::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::assistants::Assistant;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("generation failed: {0}")]
pub struct GenerationError(pub String);

/// Everything one assistant pass needs: the prompt is an owned local copy
/// of the tree path, so preprompt substitution never touches the tree.
#[derive(Clone, Debug)]
pub struct GenerationContext {
    pub conversation_id: Uuid,
    pub model: String,
    pub messages: Vec<Message>,
    pub assistant: Option<Assistant>,
    pub is_continue: bool,
    pub prompted_at: DateTime<Utc>,
}

pub type EventStream = BoxStream<'static, Result<MessageUpdate, GenerationError>>;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start one generation pass. An `Err` item mid-stream aborts the pass;
    /// the caller reports it in-band and the stream is dropped.
    async fn generate(&self, ctx: GenerationContext) -> Result<EventStream, GenerationError>;
}

/// Development backend: streams back a short echo of the last user message.
/// Keeps the service runnable without an inference provider.
pub struct EchoBackend;

#[async_trait]
impl GenerationBackend for EchoBackend {
    async fn generate(&self, ctx: GenerationContext) -> Result<EventStream, GenerationError> {
        let prompt = ctx
            .messages
            .iter()
            .rev()
            .find(|m| m.from == MessageFrom::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let reply = if ctx.is_continue {
            " (continued)".to_string()
        } else {
            format!("You said: {prompt}")
        };

        let stream = async_stream::stream! {
            // Feed the answer out in small chunks so streaming consumers
            // actually see incremental tokens in development.
            let mut rest = reply.as_str();
            while !rest.is_empty() {
                let cut = rest
                    .char_indices()
                    .nth(4)
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                let (token, remaining) = rest.split_at(cut);
                yield Ok(MessageUpdate::Stream {
                    token: token.to_string(),
                });
                rest = remaining;
            }
            yield Ok(MessageUpdate::FinalAnswer {
                text: reply.clone(),
                interrupted: false,
            });
        };

        Ok(Box::pin(stream))
    }
}
