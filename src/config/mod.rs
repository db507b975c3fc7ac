//! Configuration management for pagetree
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::index::IndexOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A `yes`/`no` switch as written in index options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn is_yes(self) -> bool {
        self == YesNo::Yes
    }
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value {
            YesNo::Yes
        } else {
            YesNo::No
        }
    }
}

impl std::fmt::Display for YesNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YesNo::Yes => write!(f, "yes"),
            YesNo::No => write!(f, "no"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion backend configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Indexing pipeline configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Tree search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Completion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible base URL (e.g. Ollama's `/v1`)
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// The single model provisioned for this deployment
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Environment variable name for an optional bearer token
    #[serde(default = "default_completion_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// Attempts per call before the failure sentinel is returned
    #[serde(default = "default_completion_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_completion_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Sampling temperature
    #[serde(default = "default_completion_temperature")]
    pub temperature: f32,

    /// The model's `tokenizer.json`; token counts are exact when set
    #[serde(
        default = "default_completion_tokenizer_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub tokenizer_path: Option<PathBuf>,
}

/// Indexing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Leading pages scanned for a table of contents
    #[serde(default = "default_toc_check_page_num")]
    pub toc_check_page_num: usize,

    /// Leaf page budget
    #[serde(default = "default_max_page_num_each_node")]
    pub max_page_num_each_node: usize,

    /// Leaf token budget
    #[serde(default = "default_max_token_num_each_node")]
    pub max_token_num_each_node: usize,

    #[serde(default = "default_add_node_id")]
    pub add_node_id: YesNo,

    #[serde(default = "default_add_node_summary")]
    pub add_node_summary: YesNo,

    #[serde(default = "default_add_doc_description")]
    pub add_doc_description: YesNo,

    #[serde(default = "default_add_node_text")]
    pub add_node_text: YesNo,

    /// Tokens of node text sent with one summary prompt
    #[serde(default = "default_summary_token_limit")]
    pub summary_token_limit: usize,

    /// Concurrent summary calls against the model server
    #[serde(default = "default_summary_concurrency")]
    pub summary_concurrency: usize,

    /// Pages searched on each side of a TOC entry's expected page
    #[serde(default = "default_reconcile_window")]
    pub reconcile_window: usize,

    /// Degrade to page grouping when the TOC detection call is exhausted
    #[serde(default = "default_allow_page_group_fallback")]
    pub allow_page_group_fallback: bool,
}

/// Tree search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of nodes returned
    #[serde(default = "default_search_max_nodes")]
    pub max_nodes: usize,

    /// Size ceiling (characters) of the projection embedded in the prompt
    #[serde(default = "default_projection_char_limit")]
    pub projection_char_limit: usize,

    /// Summary length kept when the projection has to be shortened
    #[serde(default = "default_projection_summary_chars")]
    pub projection_summary_chars: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for pagetree data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Directory holding index artifacts
    pub index_dir: PathBuf,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            model: default_completion_model(),
            api_key_env: default_completion_api_key_env(),
            timeout_secs: default_completion_timeout(),
            max_attempts: default_completion_max_attempts(),
            retry_delay_ms: default_completion_retry_delay_ms(),
            temperature: default_completion_temperature(),
            tokenizer_path: default_completion_tokenizer_path(),
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Bearer token from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            toc_check_page_num: default_toc_check_page_num(),
            max_page_num_each_node: default_max_page_num_each_node(),
            max_token_num_each_node: default_max_token_num_each_node(),
            add_node_id: default_add_node_id(),
            add_node_summary: default_add_node_summary(),
            add_doc_description: default_add_doc_description(),
            add_node_text: default_add_node_text(),
            summary_token_limit: default_summary_token_limit(),
            summary_concurrency: default_summary_concurrency(),
            reconcile_window: default_reconcile_window(),
            allow_page_group_fallback: default_allow_page_group_fallback(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_search_max_nodes(),
            projection_char_limit: default_projection_char_limit(),
            projection_summary_chars: default_projection_summary_chars(),
        }
    }
}

impl Config {
    /// Get the default base directory for pagetree (~/.pagetree)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pagetree")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(base: PathBuf, config_file: PathBuf) -> PathsConfig {
        PathsConfig {
            config_file,
            db_file: base.join("metadata.db"),
            index_dir: base.join("indices"),
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = Self::paths_for(base.clone(), base.join("config.toml"));
    }

    /// Default configuration whose paths live next to `config_path`
    pub fn for_config_file(config_path: &Path) -> Self {
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Self {
            paths: Self::paths_for(base, config_path.to_path_buf()),
            ..Self::default()
        }
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Index options for one run, seeded from this configuration
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            model: self.completion.model.clone(),
            toc_check_page_num: self.index.toc_check_page_num,
            max_page_num_each_node: self.index.max_page_num_each_node,
            max_token_num_each_node: self.index.max_token_num_each_node,
            add_node_id: self.index.add_node_id,
            add_node_summary: self.index.add_node_summary,
            add_doc_description: self.index.add_doc_description,
            add_node_text: self.index.add_node_text,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.completion.model.trim().is_empty() {
            return Err(Error::Config("completion.model must not be empty".to_string()));
        }

        if self.completion.max_attempts == 0 {
            return Err(Error::Config(
                "completion.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.completion.timeout_secs == 0 {
            return Err(Error::Config(
                "completion.timeout_secs must be positive".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(Error::Config(
                "completion.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.index.summary_concurrency == 0 {
            return Err(Error::Config(
                "index.summary_concurrency must be at least 1".to_string(),
            ));
        }

        if self.index.summary_token_limit == 0 {
            return Err(Error::Config(
                "index.summary_token_limit must be positive".to_string(),
            ));
        }

        if self.index.reconcile_window == 0 {
            return Err(Error::Config(
                "index.reconcile_window must be positive".to_string(),
            ));
        }

        if self.search.max_nodes == 0 {
            return Err(Error::Config("search.max_nodes must be positive".to_string()));
        }

        if self.search.projection_char_limit < 1000 {
            return Err(Error::Config(
                "search.projection_char_limit must be at least 1000".to_string(),
            ));
        }

        self.index_options()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }
}
