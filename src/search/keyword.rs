//! Lexical fallback ranking

use crate::tree::{DocumentTree, SectionNode};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// A node and its keyword score
#[derive(Debug, Clone, Copy)]
pub struct KeywordHit<'a> {
    pub node: &'a SectionNode,
    pub score: usize,
}

fn words(text: &str) -> HashSet<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Score every node: two points per query word in the title, one per query
/// word in the summary. Zero scores are dropped; ties keep tree order.
pub fn keyword_search<'a>(tree: &'a DocumentTree, query: &str, max_nodes: usize) -> Vec<KeywordHit<'a>> {
    let mut query_words: Vec<String> = Vec::new();
    for word in query.unicode_words().map(str::to_lowercase) {
        if !query_words.contains(&word) {
            query_words.push(word);
        }
    }
    if query_words.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<KeywordHit<'a>> = tree
        .preorder()
        .into_iter()
        .filter_map(|node| {
            let title = words(&node.title);
            let summary = node.summary.as_deref().map(words).unwrap_or_default();
            let score = query_words
                .iter()
                .map(|w| 2 * usize::from(title.contains(w)) + usize::from(summary.contains(w)))
                .sum();
            (score > 0).then_some(KeywordHit { node, score })
        })
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(max_nodes);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, title: &str, summary: &str) -> SectionNode {
        let mut node = SectionNode::new(title, 1, 1);
        node.node_id = Some(id.to_string());
        node.summary = Some(summary.to_string());
        node
    }

    fn tree() -> DocumentTree {
        DocumentTree::new(
            "doc",
            1,
            vec![
                node("0000", "Introduction", "What the product does"),
                node("0001", "Pricing Model", "Tiers and discounts"),
                node("0002", "Support", "Contact us about billing"),
            ],
        )
    }

    #[test]
    fn test_single_title_match() {
        let tree = tree();
        let hits = keyword_search(&tree, "pricing", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.title, "Pricing Model");
        assert_eq!(hits[0].score, 2);
    }

    #[test]
    fn test_title_outranks_summary_and_ties_keep_order() {
        let tree = tree();
        let hits = keyword_search(&tree, "Billing tiers, billing", 5);
        let ids: Vec<_> = hits.iter().map(|h| h.node.id()).collect();
        // "tiers" in 0001's summary and "billing" in 0002's summary: both score 1
        assert_eq!(ids, vec!["0001", "0002"]);
        assert!(hits.iter().all(|h| h.score == 1));

        let hits = keyword_search(&tree, "support billing", 5);
        assert_eq!(hits[0].score, 3);
    }

    #[test]
    fn test_no_words_no_hits() {
        assert!(keyword_search(&tree(), "!!! ...", 5).is_empty());
        assert!(keyword_search(&tree(), "quantum", 5).is_empty());
    }
}
