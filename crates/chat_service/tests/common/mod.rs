//! Shared test fixtures: a scripted generation backend and an orchestrator
//! wired against the in-memory store.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chat_service::assistants::AssistantRegistry;
use chat_service::config::UsageLimits;
use chat_service::error::Result as AppResult;
use chat_service::files::FileStore;
use chat_service::generation::{
    EventStream, GenerationBackend, GenerationContext, GenerationError,
};
use chat_service::models::{ChatModel, ModelRegistry};
use chat_service::rate_limit::MessageEventLog;
use chat_service::services::{PreparedTurn, TurnOrchestrator};
use conversation_store::{ConversationStore, MemoryConversationStore};
use conversation_tree::MessageUpdate;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const TEST_MODEL: &str = "test-model";

/// Backend that replays one pre-programmed event script per pass and
/// records every context it was handed.
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<Result<MessageUpdate, GenerationError>>>>,
    contexts: Mutex<Vec<GenerationContext>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Vec<Result<MessageUpdate, GenerationError>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn single(events: Vec<MessageUpdate>) -> Self {
        Self::new(vec![events.into_iter().map(Ok).collect()])
    }

    pub fn contexts(&self) -> Vec<GenerationContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, ctx: GenerationContext) -> Result<EventStream, GenerationError> {
        self.contexts.lock().unwrap().push(ctx);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(futures_util::stream::iter(script).boxed())
    }
}

/// Hash-only file store: content-addresses the bytes without writing them.
pub struct MemoryFileStore;

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn store(
        &self,
        _conversation_id: Uuid,
        _name: &str,
        _mime: &str,
        bytes: &[u8],
    ) -> AppResult<String> {
        Ok(hex::encode(Sha256::digest(bytes)))
    }
}

pub struct TestHarness {
    pub store: Arc<MemoryConversationStore>,
    pub backend: Arc<ScriptedBackend>,
    pub assistants: Arc<AssistantRegistry>,
    pub orchestrator: TurnOrchestrator,
}

pub fn harness_with_limits(backend: ScriptedBackend, limits: UsageLimits) -> TestHarness {
    let store = Arc::new(MemoryConversationStore::new());
    let backend = Arc::new(backend);
    let assistants = Arc::new(AssistantRegistry::new());
    let models = Arc::new(ModelRegistry::new(vec![ChatModel::new(TEST_MODEL)]));

    let orchestrator = TurnOrchestrator::new(
        store.clone(),
        backend.clone(),
        assistants.clone(),
        Arc::new(MemoryFileStore),
        Arc::new(MessageEventLog::new()),
        models,
        limits,
    );

    TestHarness {
        store,
        backend,
        assistants,
        orchestrator,
    }
}

pub fn harness(backend: ScriptedBackend) -> TestHarness {
    harness_with_limits(backend, UsageLimits::default())
}

/// Drive a prepared turn to completion, collecting the raw stream chunks
/// and the parsed events.
pub async fn run_turn(
    harness: &TestHarness,
    prepared: PreparedTurn,
) -> (bool, Vec<String>, Vec<MessageUpdate>) {
    let (tx, mut rx) = mpsc::channel::<Bytes>(1024);

    let collect = async {
        let mut chunks = Vec::new();
        while let Some(bytes) = rx.recv().await {
            chunks.push(String::from_utf8(bytes.to_vec()).unwrap());
        }
        chunks
    };

    let (completed, chunks) = tokio::join!(harness.orchestrator.run(prepared, tx), collect);

    let events = chunks
        .iter()
        .filter_map(|chunk| serde_json::from_str::<MessageUpdate>(chunk.trim_end()).ok())
        .collect();
    (completed, chunks, events)
}

/// Seed a fresh tree-form conversation in the store and return it.
pub async fn seed_conversation(
    store: &dyn ConversationStore,
    preprompt: &str,
) -> conversation_tree::Conversation {
    let conversation = conversation_tree::Conversation::new(TEST_MODEL, preprompt);
    store.insert(&conversation).await.unwrap();
    conversation
}
