//! Token counting that never fails
//!
//! Four tiers:
//! - the model's own `tokenizer.json`, when one is configured and loads
//! - a model-family estimator for model families we know the vocabulary of
//! - a generic word-boundary tokenizer for any other model id
//! - `len / 4` when there is no model id at all

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

/// How tokens are counted for a model
#[derive(Debug, Clone)]
pub enum TokenCounter {
    /// The model's tokenizer; counts are exact
    Exact(Arc<Tokenizer>),
    /// Known vocabulary; `chars_per_token` is the family's average subword length
    Family { chars_per_token: usize },
    /// Word-boundary segmentation with 4-char subwords
    Generic,
    /// `len / 4` estimate
    CharEstimate,
}

const MODEL_FAMILIES: &[(&str, usize)] = &[
    ("llama3", 4),
    ("llama-3", 4),
    ("llama2", 3),
    ("llama-2", 3),
    ("qwen", 4),
    ("mistral", 3),
    ("mixtral", 3),
    ("gemma", 4),
    ("phi", 4),
    ("deepseek", 4),
    ("gpt-4", 4),
    ("gpt-3.5", 4),
];

impl TokenCounter {
    /// Load a HuggingFace `tokenizer.json`
    pub fn from_tokenizer_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            Error::Config(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;
        Ok(TokenCounter::Exact(Arc::new(tokenizer)))
    }

    /// Exact counter when `tokenizer_path` loads, the model estimate otherwise
    pub fn resolve(model: &str, tokenizer_path: Option<&Path>) -> Self {
        if let Some(path) = tokenizer_path {
            match Self::from_tokenizer_file(path) {
                Ok(counter) => {
                    debug!("Counting tokens with {}", path.display());
                    return counter;
                }
                Err(e) => warn!("{}; estimating token counts for '{}'", e, model),
            }
        }
        Self::for_model(model)
    }

    /// Pick the estimating counter for a model id
    pub fn for_model(model: &str) -> Self {
        let model = model.trim().to_lowercase();
        if model.is_empty() {
            return TokenCounter::CharEstimate;
        }

        // "library/llama3.1:8b" -> "llama3.1"
        let name = model
            .rsplit('/')
            .next()
            .unwrap_or(&model)
            .split(':')
            .next()
            .unwrap_or(&model);

        MODEL_FAMILIES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, chars)| TokenCounter::Family {
                chars_per_token: *chars,
            })
            .unwrap_or(TokenCounter::Generic)
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TokenCounter::Exact(_))
    }

    /// Count tokens in `text`
    pub fn count(&self, text: &str) -> usize {
        match self {
            TokenCounter::Exact(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(e) => {
                    debug!("Tokenizer failed ({}), estimating", e);
                    segment_count(text, 4)
                }
            },
            TokenCounter::Family { chars_per_token } => segment_count(text, *chars_per_token),
            TokenCounter::Generic => segment_count(text, 4),
            TokenCounter::CharEstimate => text.len() / 4,
        }
    }

    /// Longest prefix of `text` that fits into `limit` tokens
    pub fn truncate<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        if self.count(text) <= limit {
            return text;
        }

        match self {
            TokenCounter::CharEstimate => {
                let mut end = (limit * 4).min(text.len());
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                &text[..end]
            }
            TokenCounter::Exact(tokenizer) => truncate_encoded(tokenizer, text, limit),
            TokenCounter::Family { chars_per_token } => truncate_segments(text, limit, *chars_per_token),
            TokenCounter::Generic => truncate_segments(text, limit, 4),
        }
    }
}

/// Count tokens for a model id
pub fn count_tokens(model: &str, text: &str) -> usize {
    TokenCounter::for_model(model).count(text)
}

fn segment_tokens(segment: &str, chars_per_token: usize) -> usize {
    if segment.trim().is_empty() {
        return 0;
    }
    let chars = segment.chars().count();
    chars.div_ceil(chars_per_token.max(1)).max(1)
}

fn segment_count(text: &str, chars_per_token: usize) -> usize {
    text.split_word_bounds()
        .map(|segment| segment_tokens(segment, chars_per_token))
        .sum()
}

fn truncate_segments(text: &str, limit: usize, chars_per_token: usize) -> &str {
    let mut used = 0;
    let mut end = 0;
    for (offset, segment) in text.split_word_bound_indices() {
        let cost = segment_tokens(segment, chars_per_token);
        if used + cost > limit {
            break;
        }
        used += cost;
        end = offset + segment.len();
    }
    &text[..end]
}

fn truncate_encoded<'a>(tokenizer: &Tokenizer, text: &'a str, limit: usize) -> &'a str {
    let encoding = match tokenizer.encode(text, false) {
        Ok(encoding) => encoding,
        Err(_) => return truncate_segments(text, limit, 4),
    };
    if limit == 0 {
        return &text[..0];
    }

    // Byte offset where the last kept token ends
    let mut end = encoding
        .get_offsets()
        .get(limit - 1)
        .map(|(_, end)| *end)
        .unwrap_or(text.len())
        .min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// A word-level `tokenizer.json` over "alpha", "beta" and "gamma"
#[cfg(test)]
pub(crate) fn write_word_level_tokenizer(dir: &Path) -> std::path::PathBuf {
    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "alpha": 1, "beta": 2, "gamma": 3 },
            "unk_token": "[UNK]"
        }
    }"#;

    let path = dir.join("tokenizer.json");
    std::fs::write(&path, WORD_LEVEL_TOKENIZER).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn word_level_counter(dir: &TempDir) -> TokenCounter {
        let path = write_word_level_tokenizer(dir.path());
        TokenCounter::resolve("llama3.1:8b", Some(path.as_path()))
    }

    #[test]
    fn test_counter_selection() {
        assert!(matches!(
            TokenCounter::for_model("llama3.1:8b"),
            TokenCounter::Family { chars_per_token: 4 }
        ));
        assert!(matches!(
            TokenCounter::for_model("library/mistral:7b"),
            TokenCounter::Family { chars_per_token: 3 }
        ));
        assert!(matches!(TokenCounter::for_model("my-custom-model"), TokenCounter::Generic));
        assert!(matches!(TokenCounter::for_model("  "), TokenCounter::CharEstimate));
    }

    #[test]
    fn test_configured_tokenizer_counts_exactly() {
        let dir = TempDir::new().unwrap();
        let counter = word_level_counter(&dir);
        assert!(counter.is_exact());

        // One token per word, the comma is its own (unknown) token
        assert_eq!(counter.count("alpha beta gamma"), 3);
        assert_eq!(counter.count("alpha, beta"), 3);
        assert_eq!(counter.count("supercalifragilistic"), 1);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_configured_tokenizer_truncates_on_token_offsets() {
        let dir = TempDir::new().unwrap();
        let counter = word_level_counter(&dir);

        assert_eq!(counter.truncate("alpha beta gamma alpha", 2), "alpha beta");
        assert_eq!(counter.truncate("alpha beta", 5), "alpha beta");
        assert_eq!(counter.truncate("alpha beta", 0), "");
    }

    #[test]
    fn test_unloadable_tokenizer_falls_back_to_estimate() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        let counter = TokenCounter::resolve("llama3.1:8b", Some(missing.as_path()));
        assert!(matches!(counter, TokenCounter::Family { chars_per_token: 4 }));

        let garbage = dir.path().join("tokenizer.json");
        std::fs::write(&garbage, "not a tokenizer").unwrap();
        assert!(TokenCounter::from_tokenizer_file(&garbage).is_err());
        assert!(!TokenCounter::resolve("", Some(garbage.as_path())).is_exact());
    }

    #[test]
    fn test_counts_words_and_punctuation() {
        // "Hello", ",", "world", "!" -> 2 + 1 + 2 + 1
        assert_eq!(count_tokens("unknown", "Hello, world!"), 6);
        assert_eq!(count_tokens("", "abcdefgh"), 2);
        assert_eq!(count_tokens("llama3", ""), 0);
    }

    #[test]
    fn test_non_latin_text_is_counted() {
        assert!(count_tokens("qwen2.5", "Привет мир, как дела?") > 0);
    }

    #[test]
    fn test_truncate_respects_limit() {
        let counter = TokenCounter::Generic;
        let text = "one two three four five six seven eight nine ten";
        let cut = counter.truncate(text, 5);
        assert!(counter.count(cut) <= 5);
        assert!(text.starts_with(cut));
        assert!(!cut.is_empty());

        assert_eq!(counter.truncate(text, 1000), text);
    }

    #[test]
    fn test_char_estimate_truncate_on_char_boundary() {
        let counter = TokenCounter::CharEstimate;
        let cut = counter.truncate("ééééééééé", 1);
        assert!(cut.len() <= 4);
    }
}
