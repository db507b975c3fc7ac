//! Document indexing pipeline
//!
//! Stages run in order for one PDF:
//! extract pages, detect a TOC, reconcile it (or group pages), build the tree,
//! annotate it, and persist the artifact. Only extraction failures, a document
//! without text, and an exhausted TOC call without fallback are fatal; every
//! other problem degrades locally and is reported in the outcome's warnings.

mod annotate;
mod builder;
pub mod job;
mod options;
mod reconcile;
mod toc;

pub use annotate::{assign_node_ids, node_text, Annotator};
pub use builder::{build_from_toc, group_pages, split_oversized, LeafBudget};
pub use job::{spawn_index_job, IndexJob};
pub use options::IndexOptions;
pub use reconcile::{ReconciledEntry, Reconciler};
pub use toc::{TableOfContents, TocDetector, TocEntry};

pub use crate::error::IndexStage;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::CompletionProvider;
use crate::pdf::{extract_pages, Page};
use crate::progress::{ProgressEvent, ProgressSink, ProgressStage};
use crate::store;
use crate::tree::DocumentTree;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Log a degraded condition and keep it for the caller
pub(crate) fn degrade(warnings: &mut Vec<String>, message: String) {
    warn!("{}", message);
    warnings.push(message);
}

/// Pipeline settings that are not per-document options
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub index_dir: PathBuf,
    pub summary_token_limit: usize,
    pub summary_concurrency: usize,
    pub reconcile_window: usize,
    pub allow_page_group_fallback: bool,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            index_dir: config.paths.index_dir.clone(),
            summary_token_limit: config.index.summary_token_limit,
            summary_concurrency: config.index.summary_concurrency,
            reconcile_window: config.index.reconcile_window,
            allow_page_group_fallback: config.index.allow_page_group_fallback,
        }
    }
}

/// Result of indexing one document
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub index_path: PathBuf,
    pub tree: DocumentTree,
    pub warnings: Vec<String>,
}

/// Indexes PDFs into section trees
pub struct Indexer {
    provider: Arc<CompletionProvider>,
    settings: IndexSettings,
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

impl Indexer {
    pub fn new(provider: Arc<CompletionProvider>, settings: IndexSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &CompletionProvider {
        &self.provider
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Index `pdf_path` and persist the artifact.
    ///
    /// A failed run emits an `error` event and leaves no artifact.
    pub async fn index_document(
        &self,
        pdf_path: &Path,
        options: &IndexOptions,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome> {
        match self.run(pdf_path, options, sink, cancel).await {
            Ok(outcome) => {
                sink.emit(ProgressEvent::new(
                    ProgressStage::Completed,
                    format!("Indexed {} sections", outcome.tree.node_count()),
                    100,
                ));
                Ok(outcome)
            }
            Err(e) => {
                sink.emit(ProgressEvent::new(ProgressStage::Failed, e.to_string(), 100));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        pdf_path: &Path,
        options: &IndexOptions,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome> {
        options.validate()?;
        sink.emit(ProgressEvent::new(
            ProgressStage::Started,
            format!("Indexing {}", pdf_path.display()),
            0,
        ));

        let path = pdf_path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_pages(&path))
            .await
            .map_err(|e| Error::indexing(IndexStage::Extraction, e))??;
        sink.emit(ProgressEvent::new(
            ProgressStage::Extraction,
            format!("Extracted {} pages", pages.len()),
            5,
        ));
        check_cancelled(cancel)?;

        let doc_name = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (tree, warnings) = self.index_pages(&doc_name, &pages, options, sink, cancel).await?;

        check_cancelled(cancel)?;
        sink.emit(ProgressEvent::new(ProgressStage::Persist, "Writing index", 95));
        let index_path = store::artifact_path(&self.settings.index_dir, pdf_path);
        store::write_index(&index_path, &tree)
            .await
            .map_err(|e| Error::indexing(IndexStage::Persist, e))?;

        info!(
            "Indexed {:?}: {} sections, {} warnings",
            pdf_path,
            tree.node_count(),
            warnings.len()
        );
        Ok(IndexOutcome {
            index_path,
            tree,
            warnings,
        })
    }

    /// Build and annotate the tree for already extracted pages
    pub async fn index_pages(
        &self,
        doc_name: &str,
        pages: &[Page],
        options: &IndexOptions,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(DocumentTree, Vec<String>)> {
        options.validate()?;
        if pages.is_empty() || pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(Error::indexing(
                IndexStage::Extraction,
                "document has no extractable text",
            ));
        }

        let provider = self.provider.as_ref();
        provider.resolve_model(Some(&options.model));
        let mut warnings = Vec::new();
        let page_tokens: Vec<usize> = pages.iter().map(|p| provider.count_tokens(&p.text)).collect();
        let budget = LeafBudget {
            max_pages: options.max_page_num_each_node,
            max_tokens: options.max_token_num_each_node,
        };

        sink.emit(ProgressEvent::new(
            ProgressStage::TocDetection,
            "Looking for a table of contents",
            10,
        ));
        let toc = TocDetector::new(provider, self.settings.allow_page_group_fallback)
            .detect(pages, options.toc_check_page_num, &mut warnings)
            .await?;
        check_cancelled(cancel)?;

        let mut structure = Vec::new();
        if let Some(toc) = toc {
            let reconciled = Reconciler::new(provider, self.settings.reconcile_window)
                .reconcile(&toc.entries, pages, &toc.toc_pages, &mut warnings)
                .await;
            structure = build_from_toc(&reconciled, &page_tokens, budget, &mut warnings);
            if structure.is_empty() {
                degrade(
                    &mut warnings,
                    "No TOC entry could be placed; grouping pages instead".to_string(),
                );
            }
        }
        if structure.is_empty() {
            structure = group_pages(pages, &page_tokens, budget, &mut warnings);
        }
        check_cancelled(cancel)?;

        let mut tree = DocumentTree::new(doc_name, pages.len(), structure);
        tree.validate()?;
        sink.emit(ProgressEvent::new(
            ProgressStage::Structure,
            format!("Built {} sections", tree.node_count()),
            30,
        ));

        Annotator::new(
            provider,
            self.settings.summary_token_limit,
            self.settings.summary_concurrency,
        )
        .annotate(&mut tree, pages, options, sink, cancel, &mut warnings)
        .await?;

        Ok((tree, warnings))
    }
}
