//! Table-of-contents detection and extraction

use super::degrade;
use crate::error::{Error, IndexStage, Result};
use crate::llm::{CompletionProvider, JsonReply};
use crate::pdf::Page;
use serde::Deserialize;
use tracing::{debug, info};

/// One printed TOC line, before page reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    /// Numbering such as `"2.1"`, when the model reported one
    pub structure: Option<String>,
    pub title: String,
    /// Printed page label or section id, verbatim
    pub page_label: Option<String>,
}

/// A detected table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOfContents {
    pub entries: Vec<TocEntry>,
    /// Physical pages the TOC itself is printed on
    pub toc_pages: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct DetectionReply {
    #[serde(default)]
    thinking: String,
    toc_detected: String,
    #[serde(default)]
    toc_pages: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    structure: Option<serde_json::Value>,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "page_or_section_id", alias = "page_number")]
    page: Option<serde_json::Value>,
}

fn value_label(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn tagged_pages(pages: &[Page]) -> String {
    pages
        .iter()
        .map(|p| format!("<page_{n}>\n{}\n</page_{n}>", p.text, n = p.number))
        .collect::<Vec<_>>()
        .join("\n")
}

fn detection_prompt(pages: &str) -> String {
    format!(
        r#"Your job is to decide whether the following pages contain a table of contents.
The pages are wrapped in <page_N> tags, where N is the physical page number.
Abstracts, lists of figures, and notation lists are not a table of contents.

{pages}

Reply with a JSON object only:
{{
    "thinking": "<why you think there is or is not a table of contents>",
    "toc_detected": "yes" or "no",
    "toc_pages": [<physical page numbers holding the table of contents>]
}}"#
    )
}

fn extraction_prompt(pages: &str) -> String {
    format!(
        r#"Extract the table of contents printed in the following pages, in order.
The pages are wrapped in <page_N> tags, where N is the physical page number.
For every entry give its numbering if it has one (e.g. "1", "2.3", "2.3.1"),
its title exactly as printed, and the page number or section id printed next to it.

{pages}

Reply with a JSON object only:
{{
    "thinking": "<notes>",
    "entries": [
        {{"structure": "<numbering or null>", "title": "<title>", "page": <printed page>}}
    ]
}}"#
    )
}

/// Finds and reads a literal table of contents in the leading pages
pub struct TocDetector<'a> {
    provider: &'a CompletionProvider,
    allow_page_group_fallback: bool,
}

impl<'a> TocDetector<'a> {
    pub fn new(provider: &'a CompletionProvider, allow_page_group_fallback: bool) -> Self {
        Self {
            provider,
            allow_page_group_fallback,
        }
    }

    /// Look for a TOC in the first `check_pages` pages.
    ///
    /// `Ok(None)` means "no TOC": either none is printed, or the model never
    /// produced usable JSON. An exhausted detection call is fatal unless page
    /// grouping is allowed as a fallback; an exhausted extraction call only
    /// degrades.
    pub async fn detect(
        &self,
        pages: &[Page],
        check_pages: usize,
        warnings: &mut Vec<String>,
    ) -> Result<Option<TableOfContents>> {
        let head = &pages[..pages.len().min(check_pages)];
        if head.is_empty() {
            return Ok(None);
        }
        let text = tagged_pages(head);
        let attempts = self.provider.max_attempts();

        let detection = match self
            .provider
            .complete_json::<DetectionReply>(&detection_prompt(&text), attempts)
            .await
        {
            JsonReply::Parsed(reply) => reply,
            JsonReply::Unparsable(e) => {
                degrade(warnings, format!("TOC detection reply unusable, treating as no TOC: {}", e));
                return Ok(None);
            }
            JsonReply::Exhausted => return self.detection_exhausted(warnings),
        };

        debug!("TOC detection reasoning: {}", detection.thinking);
        if !detection.toc_detected.trim().eq_ignore_ascii_case("yes") {
            info!("No table of contents detected");
            return Ok(None);
        }

        let toc_pages: Vec<usize> = detection
            .toc_pages
            .into_iter()
            .filter(|n| (1..=head.len()).contains(n))
            .collect();
        let source: Vec<Page> = if toc_pages.is_empty() {
            head.to_vec()
        } else {
            head.iter()
                .filter(|p| toc_pages.contains(&p.number))
                .cloned()
                .collect()
        };

        let extraction = match self
            .provider
            .complete_json::<ExtractionReply>(&extraction_prompt(&tagged_pages(&source)), attempts)
            .await
        {
            JsonReply::Parsed(reply) => reply,
            JsonReply::Unparsable(e) => {
                degrade(warnings, format!("TOC extraction reply unusable, treating as no TOC: {}", e));
                return Ok(None);
            }
            JsonReply::Exhausted => {
                degrade(
                    warnings,
                    "TOC extraction call failed after all retries; grouping pages instead".to_string(),
                );
                return Ok(None);
            }
        };

        let entries: Vec<TocEntry> = extraction
            .entries
            .into_iter()
            .filter(|e| !e.title.trim().is_empty())
            .map(|e| TocEntry {
                structure: value_label(e.structure),
                title: e.title.trim().to_string(),
                page_label: value_label(e.page),
            })
            .collect();

        if entries.is_empty() {
            degrade(warnings, "TOC detected but no entries extracted".to_string());
            return Ok(None);
        }

        info!("Extracted {} TOC entries", entries.len());
        Ok(Some(TableOfContents { entries, toc_pages }))
    }

    fn detection_exhausted(&self, warnings: &mut Vec<String>) -> Result<Option<TableOfContents>> {
        let message = "TOC detection call failed after all retries".to_string();
        if self.allow_page_group_fallback {
            degrade(warnings, format!("{}; grouping pages instead", message));
            Ok(None)
        } else {
            Err(Error::indexing(IndexStage::TocDetection, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{provider, reply, ScriptedBackend};
    use std::sync::Arc;

    fn pages() -> Vec<Page> {
        vec![
            Page::new(1, "Contents\n1 Introduction 1\n2 Pricing Model 4"),
            Page::new(2, "1 Introduction\nWidgets are small."),
            Page::new(3, "More on widgets."),
        ]
    }

    #[tokio::test]
    async fn test_detects_and_extracts_entries() {
        let backend = Arc::new(ScriptedBackend::new(|request| {
            if request.prompt().contains("decide whether") {
                Ok(reply(r#"{"thinking": "page 1 lists sections", "toc_detected": "yes", "toc_pages": [1]}"#))
            } else {
                Ok(reply(
                    r#"```json
{"thinking": "", "entries": [
  {"structure": "1", "title": "Introduction", "page": 1},
  {"structure": null, "title": "Pricing Model", "page": "4"}
]}
```"#,
                ))
            }
        }));
        let provider = provider(backend);
        let detector = TocDetector::new(&provider, true);
        let mut warnings = Vec::new();

        let toc = detector.detect(&pages(), 20, &mut warnings).await.unwrap().unwrap();
        assert_eq!(toc.toc_pages, vec![1]);
        assert_eq!(toc.entries.len(), 2);
        assert_eq!(toc.entries[0].structure.as_deref(), Some("1"));
        assert_eq!(toc.entries[1].structure, None);
        assert_eq!(toc.entries[1].page_label.as_deref(), Some("4"));
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_no_toc_detected() {
        let backend = Arc::new(ScriptedBackend::constant(
            r#"{"thinking": "just prose", "toc_detected": "no"}"#,
        ));
        let provider = provider(backend.clone());
        let detector = TocDetector::new(&provider, true);

        let toc = detector.detect(&pages(), 20, &mut Vec::new()).await.unwrap();
        assert!(toc.is_none());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_garbage_replies_mean_no_toc() {
        let backend = Arc::new(ScriptedBackend::constant("I am not sure."));
        let provider = provider(backend.clone());
        let detector = TocDetector::new(&provider, false);
        let mut warnings = Vec::new();

        let toc = detector.detect(&pages(), 20, &mut warnings).await.unwrap();
        assert!(toc.is_none());
        assert_eq!(backend.calls(), provider.max_attempts() as usize);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_detection_is_fatal_without_fallback() {
        let provider = provider(Arc::new(ScriptedBackend::failing()));

        let err = TocDetector::new(&provider, false)
            .detect(&pages(), 20, &mut Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(IndexStage::TocDetection));

        let mut warnings = Vec::new();
        let toc = TocDetector::new(&provider, true)
            .detect(&pages(), 20, &mut warnings)
            .await
            .unwrap();
        assert!(toc.is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_extraction_degrades() {
        let backend = Arc::new(ScriptedBackend::new(|request| {
            if request.prompt().contains("decide whether") {
                Ok(reply(r#"{"thinking": "", "toc_detected": "yes", "toc_pages": [1]}"#))
            } else {
                Err(Error::Completion("connection reset".to_string()))
            }
        }));
        let provider = provider(backend);
        let mut warnings = Vec::new();

        let toc = TocDetector::new(&provider, false)
            .detect(&pages(), 20, &mut warnings)
            .await
            .unwrap();
        assert!(toc.is_none());
        assert!(warnings[0].contains("extraction"));
    }
}
