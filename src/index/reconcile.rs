//! Mapping printed TOC page labels to physical pages

use super::degrade;
use super::toc::TocEntry;
use crate::llm::{CompletionProvider, JsonReply};
use crate::pdf::Page;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// A TOC entry placed on physical pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledEntry {
    pub structure: Option<String>,
    pub title: String,
    pub start_index: usize,
    pub end_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageLabel {
    Arabic(usize),
    Roman(usize),
}

fn parse_label(label: &str) -> Option<PageLabel> {
    let label = label.trim().trim_start_matches(['p', 'P']).trim_start_matches('.').trim();
    if let Ok(n) = label.parse::<usize>() {
        return Some(PageLabel::Arabic(n));
    }
    roman_value(label).map(PageLabel::Roman)
}

fn roman_value(label: &str) -> Option<usize> {
    if label.is_empty() || label.len() > 8 {
        return None;
    }
    let mut total = 0usize;
    let mut previous = 0usize;
    for c in label.to_ascii_lowercase().chars().rev() {
        let value = match c {
            'i' => 1,
            'v' => 5,
            'x' => 10,
            'l' => 50,
            'c' => 100,
            _ => return None,
        };
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }
    (total > 0).then_some(total)
}

fn numbering_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+(\.\d+)*[.)]?\s+").expect("valid regex"))
}

/// Lowercased alphanumeric words separated by single spaces
fn fold(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

struct TitleMatcher {
    folded_pages: Vec<String>,
}

impl TitleMatcher {
    fn new(pages: &[Page]) -> Self {
        Self {
            folded_pages: pages.iter().map(|p| format!(" {} ", fold(&p.text))).collect(),
        }
    }

    /// Whether `title` appears on physical page `page`
    fn matches(&self, title: &str, page: usize) -> bool {
        let Some(text) = page.checked_sub(1).and_then(|i| self.folded_pages.get(i)) else {
            return false;
        };
        let full = fold(title);
        let bare = fold(&numbering_prefix().replace(title, ""));
        [full, bare]
            .iter()
            .filter(|t| t.chars().count() >= 3)
            .any(|t| text.contains(&format!(" {} ", t)))
    }
}

#[derive(Debug, Deserialize)]
struct StartPageReply {
    #[serde(default)]
    thinking: String,
    start_page: Option<usize>,
}

fn locate_prompt(title: &str, window: &[Page]) -> String {
    let pages = window
        .iter()
        .map(|p| format!("<page_{n}>\n{}\n</page_{n}>", p.text, n = p.number))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Find the physical page on which the section "{title}" starts.
The candidate pages are wrapped in <page_N> tags, where N is the physical page number.

{pages}

Reply with a JSON object only:
{{
    "thinking": "<where the section heading appears>",
    "start_page": <N, or null if the section does not start on any of these pages>
}}"#
    )
}

/// Places TOC entries on physical pages
pub struct Reconciler<'a> {
    provider: &'a CompletionProvider,
    window: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(provider: &'a CompletionProvider, window: usize) -> Self {
        Self {
            provider,
            window: window.max(1),
        }
    }

    /// Reconcile `entries` against `pages`, skipping the TOC's own pages.
    ///
    /// Starts are non-decreasing; each entry ends where the next one begins
    /// (or on the last page). Entries that cannot be placed are dropped.
    pub async fn reconcile(
        &self,
        entries: &[TocEntry],
        pages: &[Page],
        toc_pages: &[usize],
        warnings: &mut Vec<String>,
    ) -> Vec<ReconciledEntry> {
        let page_count = pages.len();
        if page_count == 0 {
            return Vec::new();
        }

        let matcher = TitleMatcher::new(pages);
        let offset = front_matter_offset(entries, &matcher, page_count, toc_pages);
        debug!("Front-matter offset estimated at {}", offset);

        let mut starts: Vec<(usize, &TocEntry)> = Vec::new();
        let mut previous_start = 1;

        for entry in entries {
            let expected = match entry.page_label.as_deref().and_then(parse_label) {
                Some(PageLabel::Arabic(n)) => Some((n as isize + offset).max(1) as usize),
                Some(PageLabel::Roman(n)) => Some(n),
                None => None,
            };

            let (lo, hi, anchor) = match expected {
                Some(e) => (
                    previous_start.max(e.saturating_sub(self.window)),
                    page_count.min(e + self.window),
                    e,
                ),
                None => (
                    previous_start,
                    page_count.min(previous_start + 2 * self.window),
                    previous_start,
                ),
            };

            if lo > hi {
                degrade(
                    warnings,
                    format!(
                        "TOC entry '{}' points outside the document (expected page {})",
                        entry.title, anchor
                    ),
                );
                continue;
            }

            let candidates: Vec<usize> = (lo..=hi)
                .filter(|p| !toc_pages.contains(p) && matcher.matches(&entry.title, *p))
                .collect();

            let found = pick_candidate(&candidates, anchor);
            let found = match found {
                Some(page) => Some(page),
                None => self.ask_model(&entry.title, pages, lo, hi, toc_pages).await,
            };

            match found {
                Some(start) => {
                    previous_start = start;
                    starts.push((start, entry));
                }
                None => degrade(
                    warnings,
                    format!(
                        "Could not place TOC entry '{}' within pages {}-{}; dropped",
                        entry.title, lo, hi
                    ),
                ),
            }
        }

        let mut reconciled = Vec::with_capacity(starts.len());
        for (i, (start, entry)) in starts.iter().enumerate() {
            let end = match starts.get(i + 1) {
                Some((next, _)) => (*start).max(next.saturating_sub(1)),
                None => page_count,
            };
            reconciled.push(ReconciledEntry {
                structure: entry.structure.clone(),
                title: entry.title.clone(),
                start_index: *start,
                end_index: end,
            });
        }
        reconciled
    }

    async fn ask_model(
        &self,
        title: &str,
        pages: &[Page],
        lo: usize,
        hi: usize,
        toc_pages: &[usize],
    ) -> Option<usize> {
        let window: Vec<Page> = pages[lo - 1..hi]
            .iter()
            .filter(|p| !toc_pages.contains(&p.number))
            .cloned()
            .collect();
        if window.is_empty() {
            return None;
        }

        match self
            .provider
            .complete_json::<StartPageReply>(&locate_prompt(title, &window), 1)
            .await
        {
            JsonReply::Parsed(reply) => {
                debug!("Start page for '{}': {}", title, reply.thinking);
                reply
                    .start_page
                    .filter(|p| window.iter().any(|w| w.number == *p))
            }
            _ => None,
        }
    }
}

/// Earliest candidate at or after `expected`, else the closest one before it
fn pick_candidate(candidates: &[usize], expected: usize) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .find(|p| *p >= expected)
        .or_else(|| candidates.iter().copied().filter(|p| *p < expected).max())
}

/// Most common `physical - printed` difference over title matches
fn front_matter_offset(
    entries: &[TocEntry],
    matcher: &TitleMatcher,
    page_count: usize,
    toc_pages: &[usize],
) -> isize {
    let mut votes: HashMap<isize, usize> = HashMap::new();
    for entry in entries {
        let Some(PageLabel::Arabic(label)) = entry.page_label.as_deref().and_then(parse_label)
        else {
            continue;
        };
        for page in 1..=page_count {
            if !toc_pages.contains(&page) && matcher.matches(&entry.title, page) {
                *votes.entry(page as isize - label as isize).or_default() += 1;
            }
        }
    }

    votes
        .into_iter()
        .max_by(|(a_off, a_n), (b_off, b_n)| a_n.cmp(b_n).then(b_off.abs().cmp(&a_off.abs())))
        .map(|(offset, _)| offset)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{provider, reply, ScriptedBackend};
    use std::sync::Arc;

    fn entry(structure: Option<&str>, title: &str, page: &str) -> TocEntry {
        TocEntry {
            structure: structure.map(String::from),
            title: title.to_string(),
            page_label: Some(page.to_string()),
        }
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(parse_label("12"), Some(PageLabel::Arabic(12)));
        assert_eq!(parse_label("p. 7"), Some(PageLabel::Arabic(7)));
        assert_eq!(parse_label("xiv"), Some(PageLabel::Roman(14)));
        assert_eq!(parse_label("Appendix"), None);
    }

    #[test]
    fn test_pick_candidate_prefers_earliest_at_or_after() {
        assert_eq!(pick_candidate(&[3, 5, 6], 5), Some(5));
        assert_eq!(pick_candidate(&[2, 3], 5), Some(3));
        assert_eq!(pick_candidate(&[], 5), None);
    }

    #[tokio::test]
    async fn test_offset_corrects_front_matter() {
        // Two pages of front matter: printed page 1 is physical page 3
        let pages = vec![
            Page::new(1, "Title page"),
            Page::new(2, "Contents\nIntroduction 1\nPricing Model 3"),
            Page::new(3, "Introduction\nWidgets."),
            Page::new(4, "More widgets."),
            Page::new(5, "Pricing Model\nCosts."),
            Page::new(6, "Tables."),
        ];
        let entries = vec![
            entry(Some("1"), "Introduction", "1"),
            entry(Some("2"), "Pricing Model", "3"),
        ];
        let backend = Arc::new(ScriptedBackend::failing());
        let provider = provider(backend.clone());
        let mut warnings = Vec::new();

        let reconciled = Reconciler::new(&provider, 3)
            .reconcile(&entries, &pages, &[2], &mut warnings)
            .await;

        assert_eq!(reconciled.len(), 2);
        assert_eq!((reconciled[0].start_index, reconciled[0].end_index), (3, 4));
        assert_eq!((reconciled[1].start_index, reconciled[1].end_index), (5, 6));
        assert!(warnings.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_resolves_unmatched_title() {
        let pages = vec![
            Page::new(1, "Overview of things"),
            Page::new(2, "continued"),
            Page::new(3, "SECTION TWO heading mangled"),
        ];
        let entries = vec![
            entry(None, "Overview", "1"),
            entry(None, "Detailed Results", "3"),
        ];
        let backend = Arc::new(ScriptedBackend::constant(
            r#"{"thinking": "page 3 starts it", "start_page": 3}"#,
        ));
        let provider = provider(backend);

        let reconciled = Reconciler::new(&provider, 3)
            .reconcile(&entries, &pages, &[], &mut Vec::new())
            .await;
        assert_eq!(reconciled[1].start_index, 3);
        assert_eq!(reconciled[0].end_index, 2);
    }

    #[tokio::test]
    async fn test_unplaceable_entry_is_dropped() {
        let pages = vec![Page::new(1, "Alpha section"), Page::new(2, "Beta section")];
        let entries = vec![
            entry(None, "Alpha section", "1"),
            entry(None, "Gamma", "40"),
        ];
        let provider = provider(Arc::new(ScriptedBackend::constant(
            r#"{"thinking": "not here", "start_page": null}"#,
        )));
        let mut warnings = Vec::new();

        let reconciled = Reconciler::new(&provider, 3)
            .reconcile(&entries, &pages, &[], &mut warnings)
            .await;
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].end_index, 2);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_model_answer_outside_window_is_ignored() {
        let pages: Vec<Page> = (1..=10).map(|n| Page::new(n, format!("page {}", n))).collect();
        let entries = vec![entry(None, "Nowhere", "2")];
        let provider = provider(Arc::new(ScriptedBackend::new(|_| {
            Ok(reply(r#"{"thinking": "", "start_page": 9}"#))
        })));

        let reconciled = Reconciler::new(&provider, 1)
            .reconcile(&entries, &pages, &[], &mut Vec::new())
            .await;
        assert!(reconciled.is_empty());
    }
}
