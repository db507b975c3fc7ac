//! Custom error types for pagetree

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage in which an indexing run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStage {
    Extraction,
    TocDetection,
    Reconciliation,
    Structure,
    Annotation,
    Persist,
}

impl std::fmt::Display for IndexStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexStage::Extraction => write!(f, "extraction"),
            IndexStage::TocDetection => write!(f, "toc_detection"),
            IndexStage::Reconciliation => write!(f, "reconciliation"),
            IndexStage::Structure => write!(f, "structure"),
            IndexStage::Annotation => write!(f, "annotation"),
            IndexStage::Persist => write!(f, "persist"),
        }
    }
}

/// Main error type for pagetree operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Completion call timed out after {0}s")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid index options: {0}")]
    InvalidOptions(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Document {0} is not ready for search")]
    IndexNotReady(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Indexing failed during {stage}: {message}")]
    Indexing { stage: IndexStage, message: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap any error as a fatal indexing failure at `stage`
    pub fn indexing(stage: IndexStage, cause: impl std::fmt::Display) -> Self {
        Error::Indexing {
            stage,
            message: cause.to_string(),
        }
    }

    /// Stage of a fatal indexing failure, if this is one
    pub fn stage(&self) -> Option<IndexStage> {
        match self {
            Error::Indexing { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias for pagetree
pub type Result<T> = std::result::Result<T, Error>;
