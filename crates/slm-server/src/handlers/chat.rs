use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use slm_loop::{SendRequest, SendResponse, Usage};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub model: String,
    pub response: String,
    pub usage: Usage,
}

impl From<SendResponse> for ChatResponse {
    fn from(sent: SendResponse) -> Self {
        Self {
            conversation_id: sent.conversation_id,
            model: sent.model_id,
            response: sent.response_text,
            usage: sent.usage,
        }
    }
}

pub async fn handler(
    state: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    log::debug!(
        "[{}] Chat request ({} chars)",
        req.conversation_id.as_deref().unwrap_or("new"),
        req.message.chars().count()
    );

    let sent = state
        .orchestrator
        .send(SendRequest {
            conversation_id: req.conversation_id,
            text: req.message,
            model_id: req.model,
        })
        .await?;

    Ok(HttpResponse::Ok().json(ChatResponse::from(sent)))
}
