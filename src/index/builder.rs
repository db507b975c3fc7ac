//! Turning reconciled TOC entries or raw pages into a section tree

use super::degrade;
use super::reconcile::ReconciledEntry;
use crate::pdf::Page;
use crate::tree::SectionNode;
use regex::Regex;
use std::sync::OnceLock;

/// Leaf size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafBudget {
    pub max_pages: usize,
    pub max_tokens: usize,
}

fn numbered_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+(?:\.\d+)*)[.)]?\s+\S").expect("valid regex"))
}

fn numbering_depth(numbering: &str) -> Option<usize> {
    let segments: Vec<&str> = numbering
        .trim()
        .trim_end_matches('.')
        .split('.')
        .collect();
    if segments.iter().all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())) {
        Some(segments.len())
    } else {
        None
    }
}

/// Nesting depth of an entry; unnumbered entries sit at the root
fn entry_depth(entry: &ReconciledEntry) -> usize {
    entry
        .structure
        .as_deref()
        .and_then(numbering_depth)
        .or_else(|| {
            numbered_title()
                .captures(&entry.title)
                .and_then(|caps| numbering_depth(&caps[1]))
        })
        .unwrap_or(1)
}

/// Build the section forest from reconciled TOC entries.
///
/// Entries nest by numbering ("1" > "1.1" > "1.1.1"). Pages before the first
/// entry become a "Preface" root, and leaves over budget are split.
pub fn build_from_toc(
    entries: &[ReconciledEntry],
    page_tokens: &[usize],
    budget: LeafBudget,
    warnings: &mut Vec<String>,
) -> Vec<SectionNode> {
    let page_count = page_tokens.len();
    if entries.is_empty() || page_count == 0 {
        return Vec::new();
    }

    let flat = fold_shared_starts(
        entries
            .iter()
            .map(|e| (entry_depth(e), SectionNode::new(e.title.clone(), e.start_index, e.end_index)))
            .collect(),
        warnings,
    );

    let mut roots = nest(&flat);
    if let Some(first) = roots.first() {
        if first.start_index > 1 {
            roots.insert(0, SectionNode::new("Preface", 1, first.start_index - 1));
        }
    }
    tile(&mut roots, 1, page_count);

    for root in &mut roots {
        split_oversized(root, page_tokens, budget, warnings);
    }
    roots
}

/// Merge an entry into its predecessor when both start on the same page and
/// the entry is not nested under it
fn fold_shared_starts(
    flat: Vec<(usize, SectionNode)>,
    warnings: &mut Vec<String>,
) -> Vec<(usize, SectionNode)> {
    let mut folded: Vec<(usize, SectionNode)> = Vec::with_capacity(flat.len());
    for (depth, mut node) in flat {
        // A fold can leave the entry next to an ancestor on the same page
        while let Some((prev_depth, prev)) = folded.last() {
            if depth > *prev_depth || prev.start_index != node.start_index {
                break;
            }
            if depth < *prev_depth {
                degrade(
                    warnings,
                    format!(
                        "'{}' shares page {} with '{}' and is no longer nested",
                        prev.title, node.start_index, node.title
                    ),
                );
            }
            let Some((_, prev)) = folded.pop() else {
                break;
            };
            node.title = format!("{} / {}", prev.title, node.title);
            node.end_index = node.end_index.max(prev.end_index);
        }
        folded.push((depth, node));
    }
    folded
}

fn nest(flat: &[(usize, SectionNode)]) -> Vec<SectionNode> {
    let mut nodes = Vec::new();
    let mut i = 0;
    while i < flat.len() {
        let (depth, node) = &flat[i];
        let mut j = i + 1;
        while j < flat.len() && flat[j].0 > *depth {
            j += 1;
        }
        nodes.push(node.clone().with_children(nest(&flat[i + 1..j])));
        i = j;
    }
    nodes
}

/// Lay `nodes` end to end over `[start, end]`: the first starts at `start`,
/// each runs up to the page before the next, and the last ends at `end`.
/// Children are tiled over their parent's final range.
fn tile(nodes: &mut [SectionNode], start: usize, end: usize) {
    let count = nodes.len();
    let mut next_start = start;
    for i in 0..count {
        let following = nodes.get(i + 1).map_or(end + 1, |n| n.start_index);
        let node = &mut nodes[i];
        node.start_index = next_start;
        node.end_index = following.saturating_sub(1).min(end).max(next_start);
        next_start = node.end_index + 1;

        let (node_start, node_end) = (node.start_index, node.end_index);
        tile(&mut node.nodes, node_start, node_end);
    }
}

/// Group pages greedily into root leaves when there is no usable TOC
pub fn group_pages(
    pages: &[Page],
    page_tokens: &[usize],
    budget: LeafBudget,
    warnings: &mut Vec<String>,
) -> Vec<SectionNode> {
    let mut nodes = Vec::new();
    let mut start = 0;

    while start < pages.len() {
        let mut end = start;
        let mut tokens = page_tokens[start];
        if tokens > budget.max_tokens {
            degrade(
                warnings,
                format!(
                    "Page {} has {} tokens, over the {} token budget; kept as one node",
                    start + 1,
                    tokens,
                    budget.max_tokens
                ),
            );
        }

        while end + 1 < pages.len()
            && end + 1 - start < budget.max_pages
            && tokens + page_tokens[end + 1] <= budget.max_tokens
        {
            end += 1;
            tokens += page_tokens[end];
        }

        let title = group_title(&pages[start..=end])
            .unwrap_or_else(|| format!("Pages {}-{}", start + 1, end + 1));
        nodes.push(SectionNode::new(title, start + 1, end + 1));
        start = end + 1;
    }

    nodes
}

/// First line that reads like a heading
fn group_title(pages: &[Page]) -> Option<String> {
    let line = pages
        .first()?
        .text
        .lines()
        .map(str::trim)
        .find(|l| l.chars().count() >= 3 && l.chars().any(char::is_alphabetic))?;
    Some(line.chars().take(80).collect::<String>().trim_end().to_string())
}

fn range_tokens(page_tokens: &[usize], start: usize, end: usize) -> usize {
    page_tokens[start - 1..end].iter().sum()
}

fn fits(page_tokens: &[usize], start: usize, end: usize, budget: LeafBudget) -> bool {
    end + 1 - start <= budget.max_pages && range_tokens(page_tokens, start, end) <= budget.max_tokens
}

/// Halve `[start, end]` until every piece fits the budget
fn halve(
    start: usize,
    end: usize,
    page_tokens: &[usize],
    budget: LeafBudget,
    out: &mut Vec<(usize, usize)>,
    warnings: &mut Vec<String>,
) {
    if fits(page_tokens, start, end, budget) {
        out.push((start, end));
        return;
    }
    if start == end {
        degrade(
            warnings,
            format!(
                "Page {} has {} tokens, over the {} token budget; kept as one node",
                start,
                page_tokens[start - 1],
                budget.max_tokens
            ),
        );
        out.push((start, end));
        return;
    }
    let mid = start + (end - start) / 2;
    halve(start, mid, page_tokens, budget, out, warnings);
    halve(mid + 1, end, page_tokens, budget, out, warnings);
}

/// Split every leaf that exceeds the budget into page-range children
pub fn split_oversized(
    node: &mut SectionNode,
    page_tokens: &[usize],
    budget: LeafBudget,
    warnings: &mut Vec<String>,
) {
    if !node.is_leaf() {
        for child in &mut node.nodes {
            split_oversized(child, page_tokens, budget, warnings);
        }
        return;
    }

    let mut pieces = Vec::new();
    halve(node.start_index, node.end_index, page_tokens, budget, &mut pieces, warnings);
    if pieces.len() > 1 {
        node.nodes = pieces
            .into_iter()
            .map(|(s, e)| SectionNode::new(format!("{} (pages {}-{})", node.title, s, e), s, e))
            .collect();
    }
}
