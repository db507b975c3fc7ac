//! Node ids, summaries, raw text and the document description

use super::{degrade, IndexOptions};
use crate::error::{Error, Result};
use crate::llm::{Completion, CompletionProvider};
use crate::pdf::Page;
use crate::progress::{ProgressEvent, ProgressSink, ProgressStage};
use crate::tree::{DocumentTree, SectionNode};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SUMMARY_PROGRESS_START: usize = 50;
const SUMMARY_PROGRESS_SPAN: usize = 45;

fn summary_prompt(title: &str, text: &str) -> String {
    format!(
        "You are given one section of a document, titled \"{title}\".\n\
         Describe the main points this section covers in a few sentences.\n\n\
         Section text:\n{text}\n\n\
         Return the description only, with no other text."
    )
}

fn description_prompt(outline: &str) -> String {
    format!(
        "Below is the outline of a document: its top-level sections with short summaries.\n\
         Write a one-sentence description of the document that distinguishes it from other documents.\n\n\
         {outline}\n\n\
         Return the description only, with no other text."
    )
}

/// Text of the pages a node spans
pub fn node_text(pages: &[Page], node: &SectionNode) -> String {
    let start = node.start_index.saturating_sub(1).min(pages.len());
    let end = node.end_index.min(pages.len());
    pages[start..end]
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Preorder ids, zero-padded to four digits
pub fn assign_node_ids(tree: &mut DocumentTree) {
    let mut next = 0usize;
    tree.for_each_mut(|node| {
        node.node_id = Some(format!("{:04}", next));
        next += 1;
    });
}

fn attach_text(tree: &mut DocumentTree, pages: &[Page]) {
    tree.for_each_mut(|node| {
        node.text = Some(node_text(pages, node));
    });
}

/// Adds the optional annotations to a built tree
pub struct Annotator<'a> {
    provider: &'a CompletionProvider,
    summary_token_limit: usize,
    concurrency: usize,
}

impl<'a> Annotator<'a> {
    pub fn new(provider: &'a CompletionProvider, summary_token_limit: usize, concurrency: usize) -> Self {
        Self {
            provider,
            summary_token_limit,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn annotate(
        &self,
        tree: &mut DocumentTree,
        pages: &[Page],
        options: &IndexOptions,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        if options.add_node_id.is_yes() {
            assign_node_ids(tree);
        }

        if options.add_node_summary.is_yes() {
            self.summarize(tree, pages, sink, cancel, warnings).await?;
        }

        if options.add_node_text.is_yes() {
            attach_text(tree, pages);
        }

        if options.add_doc_description.is_yes() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tree.doc_description = self.describe(tree, warnings).await;
        }

        Ok(())
    }

    /// One summary per node, a bounded number in flight at a time
    pub async fn summarize(
        &self,
        tree: &mut DocumentTree,
        pages: &[Page],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let jobs: Vec<(String, String)> = tree
            .preorder()
            .into_iter()
            .map(|node| (node.title.clone(), node_text(pages, node)))
            .collect();
        let total = jobs.len();
        if total == 0 {
            return Ok(());
        }

        let provider = self.provider;
        let limit = self.summary_token_limit;
        let mut replies = stream::iter(jobs.into_iter().map(|(title, text)| async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if text.trim().is_empty() {
                return Ok((title, None));
            }
            let prompt = summary_prompt(&title, provider.truncate_to_tokens(&text, limit));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                completion = provider.complete_with_finish_reason(None, &prompt, &[]) => {
                    Ok((title, Some(completion)))
                }
            }
        }))
        .buffered(self.concurrency);

        let mut summaries: Vec<String> = Vec::with_capacity(total);
        while let Some(reply) = replies.next().await {
            let (title, completion) = reply?;
            summaries.push(match completion {
                None => String::new(),
                Some(c) if c.is_failure() => {
                    degrade(
                        warnings,
                        format!("Summary for '{}' failed; left empty", title),
                    );
                    String::new()
                }
                Some(Completion { text, .. }) => text.trim().to_string(),
            });

            let done = summaries.len();
            sink.emit(ProgressEvent::new(
                ProgressStage::Summaries,
                format!("Summarized {}/{} sections", done, total),
                (SUMMARY_PROGRESS_START + SUMMARY_PROGRESS_SPAN * done / total) as u8,
            ));
        }

        let mut summaries = summaries.into_iter();
        tree.for_each_mut(|node| {
            node.summary = Some(summaries.next().unwrap_or_default());
        });
        debug!("Attached {} summaries", total);
        Ok(())
    }

    /// Short description of the whole document from its root sections
    pub async fn describe(&self, tree: &DocumentTree, warnings: &mut Vec<String>) -> Option<String> {
        let outline = tree
            .structure
            .iter()
            .map(|node| match node.summary.as_deref() {
                Some(summary) if !summary.is_empty() => format!("- {}: {}", node.title, summary),
                _ => format!("- {}", node.title),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let completion = self
            .provider
            .complete_with_finish_reason(None, &description_prompt(&outline), &[])
            .await;
        match completion.text() {
            Some(text) => Some(text.trim().to_string()),
            None => {
                degrade(warnings, "Document description failed; omitted".to_string());
                None
            }
        }
    }
}
