//! Conversation endpoints: create, load, turn, settings, delete.
//!
//! The turn endpoint streams newline-delimited JSON update events. All
//! precondition failures are plain HTTP errors; once the stream has
//! started, failures travel in-band and the stream always closes normally.

use actix_web::{
    web::{self, Data, Json, Path},
    HttpRequest, HttpResponse,
};
use bytes::Bytes;
use conversation_tree::Conversation;
use futures_util::StreamExt;
use log::info;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::dto::{
    ConversationView, CreateConversationRequest, CreateConversationResponse,
    PatchConversationRequest, TurnRequestBody,
};
use crate::error::{AppError, Result};
use crate::server::AppState;

pub async fn create_conversation(
    app_state: Data<AppState>,
    body: Json<CreateConversationRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    let model = app_state
        .models
        .find(&request.model)
        .ok_or_else(|| AppError::BadRequest("Invalid model".to_string()))?;

    if let Some(max) = app_state.limits.max_conversations {
        if app_state.store.count().await? > max {
            return Err(AppError::RateLimited(
                "You have reached the maximum number of conversations. Delete some to continue."
                    .to_string(),
            ));
        }
    }

    let assistant_ids: Vec<Uuid> = request
        .assistant_ids
        .unwrap_or_else(|| request.assistant_id.into_iter().collect());
    let resolved = app_state.assistants.get_many(&assistant_ids).await;
    if resolved.iter().any(|(_, assistant)| assistant.is_none()) {
        return Err(AppError::NotFound("Assistant not found".to_string()));
    }

    // The first assistant's persona seeds the root; otherwise the explicit
    // preprompt, otherwise the model default.
    let preprompt = resolved
        .first()
        .and_then(|(_, assistant)| assistant.as_ref())
        .map(|assistant| assistant.preprompt.clone())
        .or(request.preprompt)
        .unwrap_or_else(|| model.preprompt.clone());

    let mut conversation = Conversation::new(model.id.clone(), preprompt);
    conversation.assistant_id = assistant_ids.first().copied();
    conversation.assistant_ids = assistant_ids;

    app_state.store.insert(&conversation).await?;
    info!("Created conversation {}", conversation.id);

    Ok(HttpResponse::Ok().json(CreateConversationResponse {
        conversation_id: conversation.id,
    }))
}

pub async fn get_conversation(
    app_state: Data<AppState>,
    path: Path<Uuid>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let mut conversation = app_state
        .store
        .load(conversation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

    // First tree-aware access converts the legacy shape. A racing writer is
    // harmless: conversion is idempotent, last writer wins.
    conversation.convert_legacy();

    let resolved = app_state
        .assistants
        .get_many(&conversation.effective_assistant_ids())
        .await;
    let assistants = resolved
        .into_iter()
        .filter_map(|(_, assistant)| assistant)
        .collect();

    Ok(HttpResponse::Ok().json(ConversationView::from_conversation(&conversation, assistants)))
}

pub async fn send_message(
    app_state: Data<AppState>,
    path: Path<Uuid>,
    body: Json<TurnRequestBody>,
    http_req: HttpRequest,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let client_key = http_req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Preconditions and the tree mutation happen before the stream starts:
    // a rejected turn is a plain HTTP error, never a partial stream.
    let prepared = app_state
        .orchestrator
        .prepare(conversation_id, &client_key, body.into_inner())
        .await?;

    let (tx, rx) = mpsc::channel::<Bytes>(64);
    let orchestrator = app_state.orchestrator.clone();
    tokio::spawn(async move {
        let completed = orchestrator.run(prepared, tx).await;
        if !completed {
            tracing::warn!(
                conversation_id = %conversation_id,
                "turn ended without clean completion"
            );
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, actix_web::Error>);
    Ok(HttpResponse::Ok()
        .content_type("application/jsonl")
        .insert_header(("x-accel-buffering", "no"))
        .streaming(stream))
}

pub async fn patch_conversation(
    app_state: Data<AppState>,
    path: Path<Uuid>,
    body: Json<PatchConversationRequest>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let request = body.into_inner();

    let title = match request.title.as_deref().map(str::trim) {
        Some(title) if title.is_empty() || title.chars().count() > 100 => {
            return Err(AppError::BadRequest(
                "Title must be between 1 and 100 characters".to_string(),
            ));
        }
        other => other,
    };

    if let Some(model) = request.model.as_deref() {
        if !app_state.models.contains(model) {
            return Err(AppError::BadRequest("Invalid model".to_string()));
        }
    }

    app_state
        .store
        .update_settings(conversation_id, title, request.model.as_deref())
        .await?;

    Ok(HttpResponse::Ok().finish())
}

pub async fn delete_conversation(
    app_state: Data<AppState>,
    path: Path<Uuid>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();

    app_state
        .store
        .load(conversation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

    app_state.store.delete(conversation_id).await?;
    info!("Deleted conversation {conversation_id}");

    Ok(HttpResponse::Ok().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/conversations")
            .route("", web::post().to(create_conversation))
            .route("/{id}", web::get().to(get_conversation))
            .route("/{id}", web::post().to(send_message))
            .route("/{id}", web::patch().to(patch_conversation))
            .route("/{id}", web::delete().to(delete_conversation)),
    );
}
