//! Single-shot generation in the writing style of a few sample texts.
//!
//! Nothing here touches the conversation store: the prompt is built from the
//! request alone and the reply is returned without being persisted.

use serde::{Deserialize, Serialize};

/// Target length used when a request names none.
pub const DEFAULT_WORD_LIMIT: u32 = 200;

/// Samples beyond this many are ignored.
pub const MAX_STYLE_EXAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRequest {
    /// Topic to write about.
    pub prompt: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default = "default_word_limit")]
    pub word_limit: u32,
    #[serde(default)]
    pub model_id: Option<String>,
}

fn default_word_limit() -> u32 {
    DEFAULT_WORD_LIMIT
}

impl StyleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            examples: Vec::new(),
            word_limit: DEFAULT_WORD_LIMIT,
            model_id: None,
        }
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_word_limit(mut self, word_limit: u32) -> Self {
        self.word_limit = word_limit;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Non-blank samples, trimmed, capped at [`MAX_STYLE_EXAMPLES`].
    pub fn usable_examples(&self) -> Vec<&str> {
        self.examples
            .iter()
            .map(|example| example.trim())
            .filter(|example| !example.is_empty())
            .take(MAX_STYLE_EXAMPLES)
            .collect()
    }

    /// Prompt text sent to the model.
    pub fn build_prompt(&self) -> String {
        let topic = self.prompt.trim();
        let examples = self.usable_examples();
        if examples.is_empty() {
            return format!(
                "Write about {}. Write approximately {} words.",
                topic, self.word_limit
            );
        }

        let mut prompt =
            String::from("Study these writing examples and then write in the same style:\n\n");
        for (index, example) in examples.iter().enumerate() {
            prompt.push_str(&format!("EXAMPLE {}:\n{}\n\n", index + 1, example));
        }
        prompt.push_str(&format!(
            "Now write in the same style for this topic: {}\n\n",
            topic
        ));
        prompt.push_str(&format!(
            "Write approximately {} words.\n\nRESPONSE:",
            self.word_limit
        ));
        prompt
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleResponse {
    pub model_id: String,
    pub generated_text: String,
    pub word_count: usize,
    pub style_analysis: String,
    pub meets_word_limit: bool,
    pub examples_used: usize,
    /// Estimated tokens of the submitted prompt.
    pub prompt_tokens: u32,
    pub elapsed_ms: u64,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub(crate) fn style_analysis(word_count: usize, examples_used: usize) -> String {
    match examples_used {
        0 => format!(
            "Generated {} words without specific style examples.",
            word_count
        ),
        1 => format!(
            "Generated {} words based on your writing example.",
            word_count
        ),
        n => format!(
            "Generated {} words based on your {} writing examples.",
            word_count, n
        ),
    }
}
