//! Model context window policy.
//!
//! Resolves the context window for a model id from the configured model
//! table, falling back to built-in sizes for common local models and finally
//! to a conservative default. Resolution never fails.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::budget::counter::TokenCounter;

/// Limit used when neither the configuration nor the built-in table knows a model.
pub const DEFAULT_CONTEXT_LIMIT: u32 = 4096;

/// Share of the context window available to the prompt; the rest is
/// headroom for the model's reply.
pub const PROMPT_BUDGET_PERCENT: u64 = 80;

/// Model id used when the configuration does not name a default.
pub const DEFAULT_MODEL: &str = "llama3.2:3b";

/// Known context window sizes for common local models.
pub const KNOWN_MODEL_LIMITS: &[(&str, u32)] = &[
    ("llama3.2:3b", 8_192),
    ("llama3.2:1b", 8_192),
    ("llama3.1:8b", 8_192),
    ("llama3.1:70b", 8_192),
    ("codellama:7b", 16_384),
    ("mistral:7b", 8_192),
    ("phi3:3.8b", 4_096),
];

/// Configured description of a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelProfile {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub context_window: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower sorts first in listings.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    1
}

impl ModelProfile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, context_window: u32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: String::new(),
            category: default_category(),
            context_window,
            enabled: true,
            priority: default_priority(),
        }
    }
}

/// Model table as stored in `models.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsConfig {
    #[serde(default)]
    pub available_models: Vec<ModelProfile>,
    #[serde(default)]
    pub default_model: Option<String>,
}

impl ModelsConfig {
    /// Table built from [`KNOWN_MODEL_LIMITS`].
    pub fn builtin() -> Self {
        let available_models = KNOWN_MODEL_LIMITS
            .iter()
            .enumerate()
            .map(|(index, (id, window))| {
                let mut profile = ModelProfile::new(*id, display_name_for(id), *window);
                profile.priority = index as u32 + 1;
                profile
            })
            .collect();

        Self {
            available_models,
            default_model: Some(DEFAULT_MODEL.to_string()),
        }
    }

    /// Load the model table from a JSON file.
    ///
    /// A missing file yields the built-in table; an unreadable or malformed
    /// file is an error so a broken configuration is noticed at startup.
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No model config at {:?}, using built-in model table", path);
            return Ok(Self::builtin());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: ModelsConfig = serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        tracing::info!(
            "Loaded {} model profiles from {:?}",
            config.available_models.len(),
            path
        );
        Ok(config)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

/// "llama3.2:3b" -> "Llama3.2 3B"
fn display_name_for(id: &str) -> String {
    let (family, size) = id.split_once(':').unwrap_or((id, ""));
    let mut chars = family.chars();
    let family = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    if size.is_empty() {
        family
    } else {
        format!("{} {}", family, size.to_uppercase())
    }
}

/// Result of checking a single prompt against a model's window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptCheck {
    pub estimated_tokens: u32,
    pub context_limit: u32,
    pub fits: bool,
    pub usage_percent: f64,
    pub tokens_remaining: i64,
}

/// Context window policy over a static model table.
#[derive(Debug, Clone)]
pub struct ContextWindowPolicy {
    profiles: Vec<ModelProfile>,
    default_model: String,
    fallback_limit: u32,
}

impl ContextWindowPolicy {
    pub fn new(config: ModelsConfig) -> Self {
        let default_model = config
            .default_model
            .filter(|model| !model.trim().is_empty())
            .or_else(|| config.available_models.first().map(|p| p.id.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self {
            profiles: config.available_models,
            default_model,
            fallback_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }

    pub fn with_fallback_limit(mut self, limit: u32) -> Self {
        self.fallback_limit = limit;
        self
    }

    /// Context window for `model_id`.
    ///
    /// # Matching Strategy
    /// 1. Exact id match in the configured table
    /// 2. Longest configured id contained in the lower-cased model id
    /// 3. Longest built-in pattern contained in the lower-cased model id
    /// 4. The fallback limit
    pub fn limit_for(&self, model_id: &str) -> u32 {
        if let Some(profile) = self.profile(model_id) {
            return profile.context_window;
        }

        let needle = model_id.trim().to_lowercase();
        if needle.is_empty() {
            return self.fallback_limit;
        }

        let configured = self
            .profiles
            .iter()
            .filter(|profile| {
                let pattern = profile.id.to_lowercase();
                !pattern.is_empty() && needle.contains(&pattern)
            })
            .max_by_key(|profile| profile.id.len())
            .map(|profile| profile.context_window);
        if let Some(window) = configured {
            return window;
        }

        let builtin = KNOWN_MODEL_LIMITS
            .iter()
            .filter(|(pattern, _)| needle.contains(pattern))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, window)| *window);

        builtin.unwrap_or_else(|| {
            tracing::debug!(
                "Unknown model '{}', using default context limit {}",
                model_id,
                self.fallback_limit
            );
            self.fallback_limit
        })
    }

    /// Prompt budget for a context window: 80% of `limit`.
    pub fn reserve_for_response(&self, limit: u32) -> u32 {
        ((limit as u64 * PROMPT_BUDGET_PERCENT) / 100) as u32
    }

    pub fn profile(&self, model_id: &str) -> Option<&ModelProfile> {
        self.profiles.iter().find(|profile| profile.id == model_id)
    }

    /// Enabled profiles ordered by priority, then display name.
    pub fn enabled_profiles(&self) -> Vec<&ModelProfile> {
        let mut profiles: Vec<&ModelProfile> =
            self.profiles.iter().filter(|profile| profile.enabled).collect();
        profiles.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        profiles
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Check whether `text` alone fits the prompt share of the model's window.
    pub fn check_prompt(&self, model_id: &str, text: &str, counter: &dyn TokenCounter) -> PromptCheck {
        let estimated_tokens = counter.count_text(text);
        let context_limit = self.limit_for(model_id);
        let usage_percent = if context_limit == 0 {
            0.0
        } else {
            (estimated_tokens as f64 / context_limit as f64) * 100.0
        };

        PromptCheck {
            estimated_tokens,
            context_limit,
            fits: estimated_tokens < self.reserve_for_response(context_limit),
            usage_percent,
            tokens_remaining: context_limit as i64 - estimated_tokens as i64,
        }
    }
}

impl Default for ContextWindowPolicy {
    fn default() -> Self {
        Self::new(ModelsConfig::builtin())
    }
}
