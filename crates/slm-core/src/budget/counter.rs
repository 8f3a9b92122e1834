//! Token counting for budget management.
//!
//! Provides a character-ratio heuristic (chars/4 for general English text).
//! No model or network call is involved, so counting never blocks or fails.

use std::sync::Arc;

/// Default characters per token ratio.
const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Trait for token counting implementations.
///
/// Implementations must be monotonic in text length and return 0 only for
/// empty text.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> u32;

    /// Count tokens in several texts.
    fn count_texts(&self, texts: &[&str]) -> u32 {
        texts
            .iter()
            .map(|text| self.count_text(text))
            .fold(0u32, |acc, x| acc.saturating_add(x))
    }
}

/// Heuristic token counter using character-based estimation.
///
/// tokens = ceil(chars / chars_per_token * safety_margin)
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Multiplier applied to the raw estimate (default: 1.0)
    safety_margin: f64,
}

impl HeuristicTokenCounter {
    /// Create a counter with custom parameters.
    ///
    /// A non-positive ratio falls back to the default and the margin is
    /// clamped to at least 1.0 so estimates never shrink below the plain ratio.
    pub fn new(chars_per_token: f64, safety_margin: f64) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        let safety_margin = if safety_margin.is_finite() {
            safety_margin.max(1.0)
        } else {
            1.0
        };
        Self {
            chars_per_token,
            safety_margin,
        }
    }

    /// Create with default parameters (chars/4, no extra margin).
    pub fn with_defaults() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            safety_margin: 1.0,
        }
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        let base_tokens = char_count / self.chars_per_token;
        let adjusted_tokens = base_tokens * self.safety_margin;

        // f64 -> u32 casts saturate
        (adjusted_tokens.ceil() as u32).max(1)
    }
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// Estimate tokens with the default heuristic counter.
pub fn estimate_tokens(text: &str) -> u32 {
    HeuristicTokenCounter::default().count_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_counter_counts_text() {
        let counter = HeuristicTokenCounter::default();
        // 13 chars / 4 = 3.25 -> 4
        assert_eq!(counter.count_text("Hello, world!"), 4);
        assert_eq!(counter.count_text("Hello"), 2);
    }

    #[test]
    fn heuristic_counter_counts_empty_text() {
        let counter = HeuristicTokenCounter::default();
        assert_eq!(counter.count_text(""), 0);
    }

    #[test]
    fn single_character_is_one_token() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens(" "), 1);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 multi-byte characters
        assert_eq!(estimate_tokens("日本語テ"), 1);
    }

    #[test]
    fn estimate_is_monotonic_over_prefixes() {
        let text = "The quick brown fox jumps over the lazy dog, again and again.";
        let mut previous = 0;
        for end in 0..=text.len() {
            if !text.is_char_boundary(end) {
                continue;
            }
            let tokens = estimate_tokens(&text[..end]);
            assert!(tokens >= previous, "estimate dropped at prefix {}", end);
            previous = tokens;
        }
    }

    #[test]
    fn estimate_is_monotonic_under_concatenation() {
        let long = "x".repeat(97);
        let samples = ["", "a", "abcd", "abcde", "Hello there", long.as_str()];
        for left in samples {
            for right in samples {
                let joined = format!("{}{}", left, right);
                let combined = estimate_tokens(&joined);
                assert!(combined >= estimate_tokens(left));
                assert!(combined >= estimate_tokens(right));
            }
        }
    }

    #[test]
    fn custom_chars_per_token() {
        let counter = HeuristicTokenCounter::new(2.0, 1.0);
        // With 2 chars per token, "test" (4 chars) = 2 tokens
        assert_eq!(counter.count_text("test"), 2);
    }

    #[test]
    fn safety_margin_applied() {
        let counter_no_margin = HeuristicTokenCounter::new(4.0, 1.0);
        let counter_with_margin = HeuristicTokenCounter::new(4.0, 1.5);

        let text = "Hello world!"; // 12 chars
        assert_eq!(counter_no_margin.count_text(text), 3);
        assert_eq!(counter_with_margin.count_text(text), 5);
    }

    #[test]
    fn invalid_parameters_fall_back() {
        let counter = HeuristicTokenCounter::new(0.0, 0.0);
        assert_eq!(counter.count_text("abcdefgh"), 2);
        assert_eq!(counter.count_text("a"), 1);
    }

    #[test]
    fn count_texts_sums_individual_counts() {
        let counter = HeuristicTokenCounter::default();
        assert_eq!(counter.count_texts(&["Hello", "Hello, world!"]), 6);
    }
}
