//! Default values for configuration

use super::YesNo;
use std::path::PathBuf;

/// Default completion endpoint (Ollama's OpenAI-compatible API)
pub fn default_completion_base_url() -> String {
    std::env::var("PAGETREE_BASE_URL").unwrap_or_else(|_| "http://localhost:11434/v1".to_string())
}

/// Default deployment model
pub fn default_completion_model() -> String {
    std::env::var("PAGETREE_MODEL").unwrap_or_else(|_| "llama3.1:8b".to_string())
}

/// Default environment variable name for an optional bearer token
pub fn default_completion_api_key_env() -> String {
    "PAGETREE_API_KEY".to_string()
}

/// Default per-call timeout in seconds (15 minutes, large documents are slow locally)
pub fn default_completion_timeout() -> u64 {
    900
}

/// Default number of attempts per completion call
pub fn default_completion_max_attempts() -> u32 {
    10
}

/// Default fixed delay between attempts (milliseconds)
pub fn default_completion_retry_delay_ms() -> u64 {
    2000
}

/// Default sampling temperature
pub fn default_completion_temperature() -> f32 {
    0.0
}

/// Tokenizer file from the environment, if any
pub fn default_completion_tokenizer_path() -> Option<PathBuf> {
    std::env::var_os("PAGETREE_TOKENIZER")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Default number of leading pages scanned for a table of contents
pub fn default_toc_check_page_num() -> usize {
    20
}

/// Default leaf page budget
pub fn default_max_page_num_each_node() -> usize {
    10
}

/// Default leaf token budget
pub fn default_max_token_num_each_node() -> usize {
    20000
}

/// Default: assign node ids
pub fn default_add_node_id() -> YesNo {
    YesNo::Yes
}

/// Default: generate node summaries
pub fn default_add_node_summary() -> YesNo {
    YesNo::Yes
}

/// Default: no document description
pub fn default_add_doc_description() -> YesNo {
    YesNo::No
}

/// Default: do not keep raw node text
pub fn default_add_node_text() -> YesNo {
    YesNo::No
}

/// Default token limit of the text sent for one summary
pub fn default_summary_token_limit() -> usize {
    4000
}

/// Default number of concurrent summary calls
pub fn default_summary_concurrency() -> usize {
    2
}

/// Default reconciliation window (± pages around the expected page)
pub fn default_reconcile_window() -> usize {
    3
}

/// Default: an exhausted TOC detection call fails the run
pub fn default_allow_page_group_fallback() -> bool {
    false
}

/// Default number of nodes returned by a search
pub fn default_search_max_nodes() -> usize {
    5
}

/// Default size ceiling of the serialized tree projection
pub fn default_projection_char_limit() -> usize {
    50_000
}

/// Default summary length inside a shortened projection
pub fn default_projection_summary_chars() -> usize {
    200
}
