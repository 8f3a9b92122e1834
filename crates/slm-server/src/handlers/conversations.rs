use actix_web::{http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};
use slm_core::{Conversation, NewConversation};

use crate::error::{ApiError, Result};
use crate::handlers::chat::ChatResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub context_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationList<T: Serialize> {
    pub conversations: Vec<T>,
    pub total: usize,
}

pub async fn create(
    state: web::Data<AppState>,
    req: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let model_id = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or_else(|| state.policy().default_model())
        .to_string();

    let request = NewConversation {
        model_id,
        title: req.title,
        context_limit: req.context_limit,
        system_prompt: req
            .system_prompt
            .or_else(|| state.orchestrator.config().system_prompt.clone()),
    };
    let conversation = state.store().create_with(request).await?;
    log::info!(
        "[{}] Conversation created (model: {}, context limit: {})",
        conversation.id,
        conversation.model_id,
        conversation.context_limit
    );

    Ok(HttpResponse::Created().json(conversation))
}

pub async fn list(state: web::Data<AppState>) -> Result<HttpResponse> {
    let conversations = state.store().list().await?;
    Ok(HttpResponse::Ok().json(ConversationList {
        total: conversations.len(),
        conversations,
    }))
}

pub async fn get(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let conversation = state.store().get(&conversation_id).await?;
    Ok(HttpResponse::Ok().json(conversation))
}

pub async fn rename(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<RenameRequest>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let conversation = state.store().rename(&conversation_id, &req.title).await?;
    log::info!("[{}] Conversation renamed", conversation_id);
    Ok(HttpResponse::Ok().json(conversation.summary()))
}

/// Idempotent: deleting an unknown conversation also answers 204.
pub async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let deleted = state.store().delete(&conversation_id).await?;
    if deleted {
        log::info!("[{}] Conversation deleted", conversation_id);
    } else {
        log::debug!("[{}] Delete requested for unknown conversation", conversation_id);
    }
    Ok(HttpResponse::NoContent().finish())
}

pub async fn export(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let conversation = state.store().get(&conversation_id).await?;
    let body = serde_json::to_string_pretty(&conversation)?;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"conversation_{}.json\"", conversation_id),
        ))
        .body(body))
}

pub async fn import(
    state: web::Data<AppState>,
    req: web::Json<Conversation>,
) -> Result<HttpResponse> {
    let conversation = req.into_inner();
    if conversation.title.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "imported conversation needs a title".to_string(),
        ));
    }
    let imported = state.store().import(conversation).await?;
    log::info!(
        "[{}] Conversation imported with {} turns",
        imported.id,
        imported.turns.len()
    );
    Ok(HttpResponse::Created().json(imported.summary()))
}

pub async fn retry(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: Option<web::Json<RetryRequest>>,
) -> Result<HttpResponse> {
    let conversation_id = path.into_inner();
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    let sent = state
        .orchestrator
        .retry(&conversation_id, req.model.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(ChatResponse::from(sent)))
}
