use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use slm_loop::{StyleRequest, StyleResponse, DEFAULT_WORD_LIMIT};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StyleGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub word_limit: Option<u32>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StyleGenerationResponse {
    pub model: String,
    pub generated_text: String,
    pub word_count: usize,
    pub style_analysis: String,
    pub meets_word_limit: bool,
    pub examples_used: usize,
    pub prompt_tokens: u32,
    pub elapsed_ms: u64,
}

impl From<StyleResponse> for StyleGenerationResponse {
    fn from(generated: StyleResponse) -> Self {
        Self {
            model: generated.model_id,
            generated_text: generated.generated_text,
            word_count: generated.word_count,
            style_analysis: generated.style_analysis,
            meets_word_limit: generated.meets_word_limit,
            examples_used: generated.examples_used,
            prompt_tokens: generated.prompt_tokens,
            elapsed_ms: generated.elapsed_ms,
        }
    }
}

/// Write about a topic in the style of the given samples. Nothing is saved.
pub async fn handler(
    state: web::Data<AppState>,
    req: web::Json<StyleGenerationRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    log::debug!(
        "Style request ({} examples, word limit {:?})",
        req.examples.len(),
        req.word_limit
    );

    let generated = state
        .orchestrator
        .generate_styled(StyleRequest {
            prompt: req.prompt,
            examples: req.examples,
            word_limit: req.word_limit.unwrap_or(DEFAULT_WORD_LIMIT),
            model_id: req.model,
        })
        .await?;

    Ok(HttpResponse::Ok().json(StyleGenerationResponse::from(generated)))
}
