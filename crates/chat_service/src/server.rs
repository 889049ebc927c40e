use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use conversation_store::{ConversationStore, FileConversationStore};
use log::info;

use crate::assistants::AssistantRegistry;
use crate::config::{ServiceConfig, UsageLimits};
use crate::controllers::conversation_controller;
use crate::files::{DiskFileStore, FileStore};
use crate::generation::{EchoBackend, GenerationBackend};
use crate::models::{ChatModel, ModelRegistry};
use crate::rate_limit::MessageEventLog;
use crate::services::TurnOrchestrator;

pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub models: Arc<ModelRegistry>,
    pub assistants: Arc<AssistantRegistry>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub limits: UsageLimits,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn GenerationBackend>,
        models: Arc<ModelRegistry>,
        assistants: Arc<AssistantRegistry>,
        files: Arc<dyn FileStore>,
        limits: UsageLimits,
    ) -> Self {
        let events = Arc::new(MessageEventLog::new());
        let orchestrator = Arc::new(TurnOrchestrator::new(
            store.clone(),
            backend,
            assistants.clone(),
            files,
            events,
            models.clone(),
            limits.clone(),
        ));
        Self {
            store,
            models,
            assistants,
            orchestrator,
            limits,
        }
    }
}

pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.configure(conversation_controller::config);
}

pub async fn run(config: ServiceConfig) -> std::io::Result<()> {
    let store: Arc<dyn ConversationStore> =
        Arc::new(FileConversationStore::new(&config.data_dir));
    let backend: Arc<dyn GenerationBackend> = Arc::new(EchoBackend);
    let models = Arc::new(ModelRegistry::new(vec![ChatModel::new(
        config.default_model.clone(),
    )]));
    let assistants = Arc::new(AssistantRegistry::new());
    let files: Arc<dyn FileStore> = Arc::new(DiskFileStore::new(&config.data_dir));

    let app_state = web::Data::new(AppState::new(
        store,
        backend,
        models,
        assistants,
        files,
        config.limits.clone(),
    ));

    info!(
        "Starting chat service on http://{}:{}",
        config.host, config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
