use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use slm_core::ModelProfile;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelsResponse<'a> {
    pub models: Vec<&'a ModelProfile>,
    pub default_model: &'a str,
}

pub async fn list(state: web::Data<AppState>) -> HttpResponse {
    let policy = state.policy();
    HttpResponse::Ok().json(ModelsResponse {
        models: policy.enabled_profiles(),
        default_model: policy.default_model(),
    })
}

#[derive(Debug, Deserialize)]
pub struct TokenCheckRequest {
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn check_tokens(
    state: web::Data<AppState>,
    req: web::Json<TokenCheckRequest>,
) -> HttpResponse {
    let check = state
        .orchestrator
        .check_tokens(req.model.as_deref(), &req.text);
    HttpResponse::Ok().json(check)
}
