//! Index command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{spawn_index_job, IndexOptions, IndexSettings, IndexStage, Indexer};
use crate::llm::CompletionProvider;
use crate::meta::{hash_file, Document, DocumentStatus, MetaDb};
use crate::progress::{percent_bar, LogSink, ProgressSink};
use crate::store;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for one `index` invocation
#[derive(Debug, Clone, Default)]
pub struct IndexRequest {
    pub options: IndexOptions,
    /// Index again even if an identical file is already ready
    pub force: bool,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

/// Result of indexing one PDF
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub document_id: String,
    pub filename: String,
    pub index_path: String,
    pub page_count: usize,
    pub node_count: usize,
    pub depth: usize,
    pub warnings: Vec<String>,
    /// An identical file was already indexed and its artifact reused
    pub reused: bool,
}

/// Register `pdf_path`, index it in the background and record the outcome
pub async fn cmd_index(
    config: &Config,
    db: &MetaDb,
    provider: Arc<CompletionProvider>,
    pdf_path: &Path,
    request: IndexRequest,
) -> Result<IndexReport> {
    if !pdf_path.is_file() {
        return Err(Error::indexing(
            IndexStage::Extraction,
            format!("PDF not found: {}", pdf_path.display()),
        ));
    }
    request.options.validate()?;

    let file_path = pdf_path.canonicalize()?;
    let content_hash = hash_file(&file_path)?;
    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    if !request.force {
        if let Some(report) = reuse_existing(db, &content_hash).await? {
            info!("{} is already indexed as {}", filename, report.document_id);
            return Ok(report);
        }
    }

    let doc = Document::new(
        filename.clone(),
        file_path.display().to_string(),
        content_hash,
    );
    db.insert_document(&doc).await?;
    db.set_indexing(&doc.id).await?;
    info!("Indexing {} as document {}", filename, doc.id);

    let mut settings = IndexSettings::from_config(config);
    settings.index_dir = config.paths.index_dir.join(&doc.id);
    let indexer = Arc::new(Indexer::new(provider, settings));

    let mut job = spawn_index_job(indexer, file_path, request.options);
    let cancel = job.cancel.clone();
    let bar = request.show_progress.then(|| percent_bar(&filename));

    loop {
        tokio::select! {
            event = job.events.recv() => match event {
                Some(event) => match &bar {
                    Some(pb) => {
                        pb.set_position(u64::from(event.progress));
                        pb.set_message(event.message);
                    }
                    None => LogSink.emit(event),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                warn!("Interrupted, cancelling indexing of {}", filename);
                cancel.cancel();
            }
        }
    }

    let result = job.wait().await;
    if let Some(pb) = &bar {
        pb.finish_and_clear();
    }

    match result {
        Ok(outcome) => {
            db.mark_ready(&doc.id, &outcome.index_path).await?;
            Ok(IndexReport {
                document_id: doc.id,
                filename,
                index_path: outcome.index_path.display().to_string(),
                page_count: outcome.tree.page_count,
                node_count: outcome.tree.node_count(),
                depth: outcome.tree.depth(),
                warnings: outcome.warnings,
                reused: false,
            })
        }
        Err(e) => {
            db.mark_error(&doc.id, &e.to_string()).await?;
            Err(e)
        }
    }
}

async fn reuse_existing(db: &MetaDb, content_hash: &str) -> Result<Option<IndexReport>> {
    let Some(existing) = db.find_by_hash(content_hash).await? else {
        return Ok(None);
    };
    if existing.status() != DocumentStatus::Ready {
        return Ok(None);
    }
    let Some(index_path) = existing.index_path.as_deref() else {
        return Ok(None);
    };

    let tree = match store::load_index(Path::new(index_path)).await {
        Ok(tree) => tree,
        Err(e) => {
            debug!("Existing index {} unusable: {}", index_path, e);
            return Ok(None);
        }
    };

    Ok(Some(IndexReport {
        document_id: existing.id,
        filename: existing.filename,
        index_path: index_path.to_string(),
        page_count: tree.page_count,
        node_count: tree.node_count(),
        depth: tree.depth(),
        warnings: Vec::new(),
        reused: true,
    }))
}

/// Print index report to console
pub fn print_index_report(report: &IndexReport) {
    if report.reused {
        println!("\n✓ Already indexed: {}", report.filename);
    } else {
        println!("\n✓ Indexed {}", report.filename);
    }
    println!("  Document ID: {}", report.document_id);
    println!("  Index: {}", report.index_path);
    println!(
        "  Pages: {}, Sections: {}, Depth: {}",
        report.page_count, report.node_count, report.depth
    );

    if !report.warnings.is_empty() {
        println!("\n⚠ {} warnings:", report.warnings.len());
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{provider, ScriptedBackend};
    use crate::pdf::testing::write_pdf;
    use tempfile::TempDir;

    async fn setup() -> (Config, MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let config = Config::for_config_file(&tmp.path().join("config.toml"));
        let db = MetaDb::new(&config.paths.db_file).await.unwrap();
        (config, db, tmp)
    }

    fn no_toc_provider() -> Arc<CompletionProvider> {
        let backend = ScriptedBackend::constant(r#"{"thinking": "", "toc_detected": "no"}"#);
        Arc::new(provider(Arc::new(backend)))
    }

    #[tokio::test]
    async fn test_index_registers_ready_document() {
        let (config, db, tmp) = setup().await;
        let pdf = tmp.path().join("notes.pdf");
        write_pdf(&pdf, &["Alpha page", "Beta page", "Gamma page"]);

        let report = cmd_index(&config, &db, no_toc_provider(), &pdf, IndexRequest::default())
            .await
            .unwrap();

        assert!(!report.reused);
        assert_eq!(report.page_count, 3);
        let path = db.ready_index_path(&report.document_id).await.unwrap();
        assert!(path.starts_with(config.paths.index_dir.join(&report.document_id)));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_identical_file_is_reused_unless_forced() {
        let (config, db, tmp) = setup().await;
        let pdf = tmp.path().join("notes.pdf");
        write_pdf(&pdf, &["Alpha page"]);

        let first = cmd_index(&config, &db, no_toc_provider(), &pdf, IndexRequest::default())
            .await
            .unwrap();
        let second = cmd_index(&config, &db, no_toc_provider(), &pdf, IndexRequest::default())
            .await
            .unwrap();
        assert!(second.reused);
        assert_eq!(second.document_id, first.document_id);

        let forced = IndexRequest {
            force: true,
            ..Default::default()
        };
        let third = cmd_index(&config, &db, no_toc_provider(), &pdf, forced)
            .await
            .unwrap();
        assert_ne!(third.document_id, first.document_id);
        assert_eq!(db.list_documents().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_run_is_recorded() {
        let (config, db, tmp) = setup().await;
        let pdf = tmp.path().join("blank.pdf");
        write_pdf(&pdf, &["   "]);

        let err = cmd_index(&config, &db, no_toc_provider(), &pdf, IndexRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(IndexStage::Extraction));

        let docs = db.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status(), DocumentStatus::Error);
        assert!(docs[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_registered() {
        let (config, db, tmp) = setup().await;
        let err = cmd_index(
            &config,
            &db,
            no_toc_provider(),
            &tmp.path().join("nope.pdf"),
            IndexRequest::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.stage(), Some(IndexStage::Extraction));
        assert!(db.list_documents().await.unwrap().is_empty());
    }
}
