use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use slm_core::{
    ContextWindowPolicy, ConversationStore, InMemoryConversationStore, JsonlConversationStore,
    ModelsConfig,
};
use slm_llm::{InferenceProvider, OllamaProvider, OpenAIProvider, DEFAULT_OLLAMA_URL};
use slm_loop::ChatConfig;
use slm_server::logging::init_logging;
use slm_server::{run_server, AppState, ServerConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "slm-server")]
#[command(about = "Local small-language-model chat server")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Bind address
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// Inference backend
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "ollama")]
    provider: ProviderType,

    /// Inference API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = DEFAULT_OLLAMA_URL)]
    llm_base_url: String,

    /// API key for OpenAI-compatible backends
    #[arg(long, env = "LLM_API_KEY")]
    api_key: Option<String>,

    /// Model table (JSON); defaults to <data-dir>/models.json
    #[arg(long, env = "MODELS_CONFIG")]
    models_config: Option<PathBuf>,

    /// Data directory; defaults to ~/.slm-chat
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Conversation storage backend
    #[arg(long, env = "STORAGE", value_enum, default_value = "jsonl")]
    storage: StorageType,

    /// Upper bound on one inference call, in seconds
    #[arg(long, env = "INFERENCE_TIMEOUT_SECS", default_value = "120")]
    inference_timeout_secs: u64,

    /// System prompt for new conversations
    #[arg(long, env = "SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// Skip the health check before each generation
    #[arg(long)]
    no_health_check: bool,

    /// Log level (overrides debug flag)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProviderType {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum StorageType {
    Jsonl,
    Memory,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".slm-chat")
}

fn build_provider(cli: &Cli) -> Arc<dyn InferenceProvider> {
    match cli.provider {
        ProviderType::Ollama => {
            Arc::new(OllamaProvider::new().with_base_url(cli.llm_base_url.clone()))
        }
        ProviderType::OpenAI => {
            let mut provider = OpenAIProvider::new().with_base_url(cli.llm_base_url.clone());
            if let Some(api_key) = &cli.api_key {
                provider = provider.with_api_key(api_key.clone());
            }
            Arc::new(provider)
        }
    }
}

async fn build_store(
    cli: &Cli,
    data_dir: &std::path::Path,
    policy: Arc<ContextWindowPolicy>,
) -> anyhow::Result<Arc<dyn ConversationStore>> {
    match cli.storage {
        StorageType::Memory => {
            log::warn!("Using in-memory storage; conversations are lost on exit");
            Ok(Arc::new(InMemoryConversationStore::new(policy)))
        }
        StorageType::Jsonl => {
            let path = data_dir.join("conversations");
            let store = JsonlConversationStore::new(&path, policy);
            store
                .init()
                .await
                .with_context(|| format!("failed to initialize storage at {:?}", path))?;
            log::info!("Storage initialized at: {:?}", path);
            Ok(Arc::new(store))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.log_level.as_deref());

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let models_path = cli
        .models_config
        .clone()
        .unwrap_or_else(|| data_dir.join("models.json"));

    log::info!("Starting slm-server on {}:{}", cli.host, cli.port);
    log::info!("Inference Configuration:");
    log::info!("  Provider: {:?}", cli.provider);
    log::info!("  Base URL: {}", cli.llm_base_url);
    log::info!("  Timeout: {}s", cli.inference_timeout_secs);

    let models = ModelsConfig::load(&models_path)
        .await
        .with_context(|| format!("failed to load model table {:?}", models_path))?;
    let policy = Arc::new(ContextWindowPolicy::new(models));
    log::info!("Default model: {}", policy.default_model());

    let provider = build_provider(&cli);
    if provider.health().await {
        log::info!("Inference service ({}) is running", provider.name());
    } else {
        log::warn!(
            "Inference service ({}) is not reachable at {}; chat requests will fail until it starts",
            provider.name(),
            cli.llm_base_url
        );
    }

    let store = build_store(&cli, &data_dir, policy.clone()).await?;

    let config = ChatConfig {
        inference_timeout: Duration::from_secs(cli.inference_timeout_secs),
        health_check: !cli.no_health_check,
        system_prompt: cli.system_prompt.clone(),
        ..ChatConfig::default()
    };

    if cli.debug {
        log::debug!("Debug mode enabled");
        log::debug!("  Data dir: {:?}", data_dir);
        log::debug!("  Models config: {:?}", models_path);
        log::debug!("  Storage: {:?}", cli.storage);
        log::debug!("  Health check: {}", config.health_check);
    }

    let state = AppState::new(store, provider, policy, config);
    let server_config = ServerConfig {
        host: cli.host.clone(),
        port: cli.port,
    };

    run_server(server_config, state)
        .await
        .context("HTTP server failed")
}
