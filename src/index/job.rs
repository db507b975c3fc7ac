//! Background indexing jobs

use super::{IndexOptions, IndexOutcome, Indexer};
use crate::error::{Error, Result};
use crate::progress::{ChannelSink, ProgressEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running indexing job
pub struct IndexJob {
    /// Progress events, closed when the job ends
    pub events: mpsc::UnboundedReceiver<ProgressEvent>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<IndexOutcome>>,
}

impl IndexJob {
    /// Request cancellation; the job stops at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job, discarding any unread events
    pub async fn wait(self) -> Result<IndexOutcome> {
        self.handle
            .await
            .map_err(|e| Error::Other(format!("indexing task failed: {}", e)))?
    }
}

/// Index `pdf_path` on a background task
pub fn spawn_index_job(indexer: Arc<Indexer>, pdf_path: PathBuf, options: IndexOptions) -> IndexJob {
    let (tx, events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        let sink = ChannelSink::new(tx);
        indexer
            .index_document(&pdf_path, &options, &sink, &token)
            .await
    });

    IndexJob {
        events,
        cancel,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexSettings;
    use crate::llm::testing::{provider, ScriptedBackend};
    use crate::pdf::testing::write_pdf;
    use crate::progress::ProgressStage;
    use tempfile::TempDir;

    fn indexer(dir: &std::path::Path) -> Arc<Indexer> {
        let backend = ScriptedBackend::constant(r#"{"thinking": "", "toc_detected": "no"}"#);
        Arc::new(Indexer::new(
            Arc::new(provider(Arc::new(backend))),
            IndexSettings {
                index_dir: dir.join("indices"),
                summary_token_limit: 500,
                summary_concurrency: 2,
                reconcile_window: 3,
                allow_page_group_fallback: true,
            },
        ))
    }

    #[tokio::test]
    async fn test_job_streams_events_until_done() {
        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("notes.pdf");
        write_pdf(&pdf, &["First page", "Second page"]);

        let mut job = spawn_index_job(indexer(tmp.path()), pdf, IndexOptions::default());
        let mut stages = Vec::new();
        while let Some(event) = job.events.recv().await {
            stages.push(event.stage);
        }
        let outcome = job.wait().await.unwrap();

        assert_eq!(stages.first(), Some(&ProgressStage::Started));
        assert_eq!(stages.last(), Some(&ProgressStage::Completed));
        assert!(outcome.index_path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_job_fails_without_artifact() {
        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("notes.pdf");
        write_pdf(&pdf, &["First page"]);

        let job = spawn_index_job(indexer(tmp.path()), pdf, IndexOptions::default());
        job.cancel();
        let err = job.wait().await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(!tmp.path().join("indices").join("notes_structure.json").exists());
    }
}
