//! Compact tree view embedded in the search prompt

use crate::tree::{DocumentTree, SectionNode};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ProjectedNode<'a> {
    node_id: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<ProjectedNode<'a>>,
}

#[derive(Debug, Clone, Copy)]
enum Summaries {
    Full,
    Shortened(usize),
    Omitted,
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn project_nodes<'a>(
    nodes: &'a [SectionNode],
    depth: usize,
    max_depth: usize,
    summaries: Summaries,
) -> Vec<ProjectedNode<'a>> {
    nodes
        .iter()
        .map(|node| ProjectedNode {
            node_id: node.id(),
            title: &node.title,
            summary: match (summaries, node.summary.as_deref()) {
                (Summaries::Full, Some(s)) if !s.is_empty() => Some(s.to_string()),
                (Summaries::Shortened(n), Some(s)) if !s.is_empty() => Some(shorten(s, n)),
                _ => None,
            },
            nodes: if depth < max_depth {
                project_nodes(&node.nodes, depth + 1, max_depth, summaries)
            } else {
                Vec::new()
            },
        })
        .collect()
}

/// JSON projection of ids, titles and summaries no longer than `char_limit`
/// characters where possible.
///
/// Tries, in order: the full tree; two levels with shortened summaries; two
/// levels without summaries; roots only.
pub fn project(tree: &DocumentTree, char_limit: usize, summary_chars: usize) -> String {
    let levels = [
        (usize::MAX, Summaries::Full),
        (2, Summaries::Shortened(summary_chars)),
        (2, Summaries::Omitted),
        (1, Summaries::Omitted),
    ];

    let mut last = String::new();
    for (level, (max_depth, summaries)) in levels.into_iter().enumerate() {
        let projected = project_nodes(&tree.structure, 1, max_depth, summaries);
        last = serde_json::to_string(&projected).unwrap_or_default();
        if last.chars().count() <= char_limit {
            if level > 0 {
                debug!("Tree projection reduced to level {}", level);
            }
            return last;
        }
    }

    warn!(
        "Tree projection still {} chars after reduction (limit {})",
        last.chars().count(),
        char_limit
    );
    last
}
