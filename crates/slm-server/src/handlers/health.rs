use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::state::{AppState, API_VERSION};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: String,
    pub inference_running: bool,
    pub available_models: Vec<String>,
    pub api_version: &'static str,
}

/// Service status. Always 200: a stopped inference backend is reported in
/// the body, not as an HTTP failure.
pub async fn handler(state: web::Data<AppState>) -> HttpResponse {
    let provider = state.provider();
    let inference_running = provider.health().await;

    let available_models = if inference_running {
        match provider.list_models().await {
            Ok(models) => models,
            Err(error) => {
                log::warn!("Failed to list models from {}: {}", provider.name(), error);
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let status = if inference_running {
        "healthy"
    } else {
        "inference_offline"
    };

    HttpResponse::Ok().json(HealthResponse {
        status,
        provider: provider.name().to_string(),
        inference_running,
        available_models,
        api_version: API_VERSION,
    })
}
