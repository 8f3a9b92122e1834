use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use serde_json::Value;
use slm_core::{
    estimate_tokens, ContextWindowPolicy, ConversationStore, InMemoryConversationStore,
    JsonlConversationStore, ModelProfile, ModelsConfig,
};
use slm_llm::{GenerationRequest, GenerationResponse, InferenceProvider, LLMError};
use slm_loop::ChatConfig;
use slm_server::{app_config, AppState};

struct StubProvider {
    healthy: AtomicBool,
    failing: AtomicBool,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl InferenceProvider for StubProvider {
    async fn generate(&self, request: &GenerationRequest) -> slm_llm::Result<GenerationResponse> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LLMError::Api {
                status: 500,
                message: "model crashed".to_string(),
            });
        }
        let last = request
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        Ok(GenerationResponse {
            text: format!("echo: {}", last),
            usage: None,
        })
    }

    async fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn list_models(&self) -> slm_llm::Result<Vec<String>> {
        Ok(vec!["modelA".to_string()])
    }

    fn name(&self) -> &str {
        "stub"
    }
}

fn policy() -> Arc<ContextWindowPolicy> {
    let mut hidden = ModelProfile::new("hidden", "Hidden", 2048);
    hidden.enabled = false;
    Arc::new(ContextWindowPolicy::new(ModelsConfig {
        available_models: vec![ModelProfile::new("modelA", "Model A", 150), hidden],
        default_model: Some("modelA".to_string()),
    }))
}

fn state_with(provider: Arc<StubProvider>, store: Arc<dyn ConversationStore>) -> web::Data<AppState> {
    web::Data::new(AppState::new(store, provider, policy(), ChatConfig::default()))
}

fn memory_state(provider: Arc<StubProvider>) -> web::Data<AppState> {
    state_with(provider, Arc::new(InMemoryConversationStore::new(policy())))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data($state.clone()).configure(app_config)).await
    };
}

#[actix_web::test]
async fn health_reports_inference_status() {
    let provider = Arc::new(StubProvider::new());
    let state = memory_state(provider.clone());
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["inference_running"], true);
    assert_eq!(body["available_models"][0], "modelA");

    provider.healthy.store(false, Ordering::SeqCst);
    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "inference_offline");
    assert_eq!(body["inference_running"], false);
    assert_eq!(body["available_models"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn models_lists_enabled_profiles() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/v1/models").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["default_model"], "modelA");
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], "modelA");
    assert_eq!(models[0]["context_window"], 150);
}

#[actix_web::test]
async fn token_check_reports_fit() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/tokens/check")
        .set_json(serde_json::json!({"text": "a".repeat(400), "model": "modelA"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["estimated_tokens"], 100);
    assert_eq!(body["context_limit"], 150);
    assert_eq!(body["fits"], true);
    assert_eq!(body["tokens_remaining"], 50);
}

#[actix_web::test]
async fn conversation_lifecycle() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .set_json(serde_json::json!({"model": "modelA", "title": "Test"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["context_limit"], 150);
    assert_eq!(created["turns"].as_array().unwrap().len(), 0);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/conversations/{}", id))
        .set_json(serde_json::json!({"title": "Renamed"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations")
        .to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["conversations"][0]["title"], "Renamed");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/conversations/{}", id))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/conversations/{}", id))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "not_found");
    assert_eq!(body["error"]["retryable"], false);
}

#[actix_web::test]
async fn chat_creates_conversation_and_replies() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "Hello"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["response"], "echo: Hello");
    assert_eq!(body["model"], "modelA");
    assert_eq!(body["usage"]["fit_without_trimming"], true);
    assert_eq!(body["usage"]["overflow"], false);

    let id = body["conversation_id"].as_str().unwrap();
    let conversation = state.store().get(id).await.unwrap();
    assert_eq!(conversation.turns.len(), 2);
}

#[actix_web::test]
async fn chat_rejects_empty_message() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(state.store().list().await.unwrap().is_empty());
}

#[actix_web::test]
async fn malformed_json_is_bad_request() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request");
}

#[actix_web::test]
async fn chat_to_unknown_conversation_is_not_found() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "Hi", "conversation_id": "missing"}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unavailable_inference_is_503_and_retry_completes() {
    let provider = Arc::new(StubProvider::new());
    provider.healthy.store(false, Ordering::SeqCst);
    let state = memory_state(provider.clone());
    let app = app!(state);

    let conversation = state.store().create("modelA", "Test").await.unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "Hi", "conversation_id": conversation.id.clone()}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "inference_unavailable");
    assert_eq!(body["error"]["retryable"], true);

    provider.healthy.store(true, Ordering::SeqCst);
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/conversations/{}/retry", conversation.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["response"], "echo: Hi");

    let stored = state.store().get(&conversation.id).await.unwrap();
    assert_eq!(stored.turns.len(), 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/conversations/{}/retry", conversation.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn inference_failure_is_bad_gateway() {
    let provider = Arc::new(StubProvider::new());
    provider.failing.store(true, Ordering::SeqCst);
    let state = memory_state(provider);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "Hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let summaries = state.store().list().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].turn_count, 1);
}

#[actix_web::test]
async fn export_then_import_round_trips() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = JsonlConversationStore::new(temp_dir.path(), policy());
    store.init().await.unwrap();
    let state = state_with(Arc::new(StubProvider::new()), Arc::new(store));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "Hello"}))
        .to_request();
    let sent: Value = test::call_and_read_body_json(&app, req).await;
    let id = sent["conversation_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}/export", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("attachment"));
    let exported: Value = test::read_body_json(resp).await;
    assert_eq!(exported["turns"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations/import")
        .set_json(&exported)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CONFLICT
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/conversations/{}", id))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations/import")
        .set_json(&exported)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let restored = state.store().get(&id).await.unwrap();
    assert_eq!(restored.turns.len(), 2);
    assert_eq!(restored.turns[1].content, "echo: Hello");
}

#[actix_web::test]
async fn import_recomputes_token_counts() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/chat")
        .set_json(serde_json::json!({"message": "x".repeat(300)}))
        .to_request();
    let sent: Value = test::call_and_read_body_json(&app, req).await;
    let id = sent["conversation_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}/export", id))
        .to_request();
    let mut exported: Value = test::call_and_read_body_json(&app, req).await;
    for turn in exported["turns"].as_array_mut().unwrap() {
        turn["token_count"] = serde_json::json!(0);
    }

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/conversations/{}", id))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations/import")
        .set_json(&exported)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let summary: Value = test::read_body_json(resp).await;

    let restored = state.store().get(&id).await.unwrap();
    for turn in &restored.turns {
        assert_eq!(turn.token_count, estimate_tokens(&turn.content));
    }
    assert_eq!(restored.turns[0].token_count, 75);
    assert_eq!(summary["total_tokens"], restored.total_tokens());
}

#[actix_web::test]
async fn style_generation_reports_words_without_saving() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/style")
        .set_json(serde_json::json!({
            "prompt": "the sea",
            "examples": ["Calm water.", "   "],
            "word_limit": 3
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let text = body["generated_text"].as_str().unwrap();
    assert!(text.starts_with("echo: Study these writing examples"));
    assert!(text.contains("EXAMPLE 1:\nCalm water."));
    assert_eq!(body["word_count"], text.split_whitespace().count());
    assert_eq!(body["meets_word_limit"], false);
    assert_eq!(body["examples_used"], 1);
    assert_eq!(body["model"], "modelA");
    assert!(state.store().list().await.unwrap().is_empty());
}

#[actix_web::test]
async fn style_generation_rejects_blank_prompt() {
    let state = memory_state(Arc::new(StubProvider::new()));
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/api/v1/style")
        .set_json(serde_json::json!({"prompt": " "}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request");
}
