//! Reasoning-based tree search
//!
//! The model reads a projection of the section tree and picks the nodes most
//! likely to answer the query. When it cannot be reached or its reply cannot
//! be used, a lexical keyword ranking takes over and the result says so.

pub mod answer;
mod keyword;
mod projection;

pub use answer::{answer_question, Answer};
pub use keyword::{keyword_search, KeywordHit};
pub use projection::project;

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::index::assign_node_ids;
use crate::llm::{CompletionProvider, JsonReply};
use crate::store;
use crate::tree::{DocumentTree, SectionNode};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Most sources listed with a result
pub const MAX_SOURCES: usize = 5;

/// How the nodes of a result were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Reasoning,
    KeywordFallback,
    EmptyTree,
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMethod::Reasoning => write!(f, "reasoning"),
            SearchMethod::KeywordFallback => write!(f, "keyword_fallback"),
            SearchMethod::EmptyTree => write!(f, "empty_tree"),
        }
    }
}

/// Reference to a selected section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub node_id: String,
    pub title: String,
    /// Page range, e.g. `"4-7"`
    pub pages: String,
}

/// Outcome of one search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub method: SearchMethod,
    /// The model's reasoning, or why the fallback ran
    pub thinking: String,
    pub node_ids: Vec<String>,
    pub nodes: Vec<SectionNode>,
    /// Keyword scores, parallel to `nodes`, for fallback results
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword_scores: Vec<usize>,
    pub context: String,
    pub sources: Vec<Source>,
}

impl SearchResult {
    fn from_nodes(
        query: &str,
        method: SearchMethod,
        thinking: String,
        nodes: Vec<SectionNode>,
        keyword_scores: Vec<usize>,
    ) -> Self {
        let context = nodes
            .iter()
            .map(|n| format!("Section: {}\n{}", n.title, n.summary.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = nodes
            .iter()
            .take(MAX_SOURCES)
            .map(|n| Source {
                node_id: n.id().to_string(),
                title: n.title.clone(),
                pages: n.pages_label(),
            })
            .collect();

        Self {
            query: query.to_string(),
            method,
            thinking,
            node_ids: nodes.iter().map(|n| n.id().to_string()).collect(),
            nodes,
            keyword_scores,
            context,
            sources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A tree in memory or an artifact on disk
#[derive(Debug, Clone, Copy)]
pub enum TreeSource<'a> {
    Tree(&'a DocumentTree),
    Path(&'a Path),
}

impl<'a> From<&'a DocumentTree> for TreeSource<'a> {
    fn from(tree: &'a DocumentTree) -> Self {
        TreeSource::Tree(tree)
    }
}

impl<'a> From<&'a Path> for TreeSource<'a> {
    fn from(path: &'a Path) -> Self {
        TreeSource::Path(path)
    }
}

#[derive(Debug, Deserialize)]
struct NodeSelection {
    #[serde(default)]
    thinking: String,
    #[serde(default)]
    node_list: Vec<serde_json::Value>,
}

fn search_prompt(query: &str, projection: &str, max_nodes: usize) -> String {
    format!(
        r#"You are given a question and the tree structure of a document.
Each node has a node_id, a title and possibly a summary of its content.
Find the nodes most likely to contain the answer to the question, at most {max_nodes} of them, most relevant first.

Question: {query}

Document tree structure:
{projection}

Reply with a JSON object only:
{{
    "thinking": "<your reasoning about which nodes are relevant>",
    "node_list": ["<node_id>", "..."]
}}"#
    )
}

fn selection_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Searches section trees with one completion provider
pub struct TreeSearch<'a> {
    provider: &'a CompletionProvider,
    config: SearchConfig,
}

impl<'a> TreeSearch<'a> {
    pub fn new(provider: &'a CompletionProvider, config: SearchConfig) -> Self {
        Self { provider, config }
    }

    /// Search a tree or a persisted artifact
    pub async fn search_source(
        &self,
        source: TreeSource<'_>,
        query: &str,
        max_nodes: Option<usize>,
    ) -> Result<SearchResult> {
        match source {
            TreeSource::Tree(tree) => self.search(tree, query, max_nodes).await,
            TreeSource::Path(path) => {
                let tree = store::load_index(path).await?;
                self.search(&tree, query, max_nodes).await
            }
        }
    }

    /// Select up to `max_nodes` nodes relevant to `query`
    pub async fn search(
        &self,
        tree: &DocumentTree,
        query: &str,
        max_nodes: Option<usize>,
    ) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }
        let max_nodes = max_nodes.unwrap_or(self.config.max_nodes);
        if max_nodes == 0 {
            return Err(Error::InvalidQuery("max_nodes must be at least 1".to_string()));
        }

        if tree.is_empty() {
            return Ok(SearchResult::from_nodes(
                query,
                SearchMethod::EmptyTree,
                "The document has no sections.".to_string(),
                Vec::new(),
                Vec::new(),
            ));
        }

        let tree = with_node_ids(tree);
        let projection = project(
            &tree,
            self.config.projection_char_limit,
            self.config.projection_summary_chars,
        );

        let reason = match self
            .provider
            .complete_json::<NodeSelection>(&search_prompt(query, &projection, max_nodes), 1)
            .await
        {
            JsonReply::Parsed(selection) => {
                match resolve_selection(&tree, &selection, max_nodes) {
                    Some(nodes) => {
                        info!("Reasoning search selected {} nodes", nodes.len());
                        return Ok(SearchResult::from_nodes(
                            query,
                            SearchMethod::Reasoning,
                            selection.thinking,
                            nodes,
                            Vec::new(),
                        ));
                    }
                    None => "the model selected only unknown node ids".to_string(),
                }
            }
            JsonReply::Unparsable(e) => format!("the model reply was not usable JSON ({})", e),
            JsonReply::Exhausted => "the model could not be reached".to_string(),
        };

        warn!("Falling back to keyword search: {}", reason);
        let hits = keyword_search(&tree, query, max_nodes);
        let scores = hits.iter().map(|h| h.score).collect();
        let nodes = hits.into_iter().map(|h| h.node.clone()).collect();
        Ok(SearchResult::from_nodes(
            query,
            SearchMethod::KeywordFallback,
            format!("Keyword search used because {}.", reason),
            nodes,
            scores,
        ))
    }
}

/// Search `source` for `query`, returning at most `max_nodes` nodes
pub async fn search_tree(
    provider: &CompletionProvider,
    config: &SearchConfig,
    source: TreeSource<'_>,
    query: &str,
    max_nodes: Option<usize>,
) -> Result<SearchResult> {
    TreeSearch::new(provider, config.clone())
        .search_source(source, query, max_nodes)
        .await
}

/// Trees indexed without ids get preorder ids for the duration of a search
fn with_node_ids(tree: &DocumentTree) -> Cow<'_, DocumentTree> {
    if tree.preorder().iter().all(|n| n.node_id.is_some()) {
        return Cow::Borrowed(tree);
    }
    let mut owned = tree.clone();
    assign_node_ids(&mut owned);
    Cow::Owned(owned)
}

/// Known nodes in selection order, deduplicated and capped.
///
/// `None` when the model named nodes but none of them exist.
fn resolve_selection(
    tree: &DocumentTree,
    selection: &NodeSelection,
    max_nodes: usize,
) -> Option<Vec<SectionNode>> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    let mut unknown = 0;

    for id in selection.node_list.iter().filter_map(selection_id) {
        let node = tree.find(&id).or_else(|| {
            id.parse::<usize>()
                .ok()
                .and_then(|n| tree.find(&format!("{:04}", n)))
        });
        match node {
            Some(node) => {
                if seen.insert(node.id().to_string()) && nodes.len() < max_nodes {
                    nodes.push(node.clone());
                }
            }
            None => {
                debug!("Dropping unknown node id '{}'", id);
                unknown += 1;
            }
        }
    }

    if nodes.is_empty() && unknown > 0 {
        None
    } else {
        Some(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{provider, reply, ScriptedBackend};
    use std::sync::Arc;

    fn node(id: &str, title: &str, summary: &str, start: usize, end: usize) -> SectionNode {
        let mut node = SectionNode::new(title, start, end);
        node.node_id = Some(id.to_string());
        node.summary = Some(summary.to_string());
        node
    }

    fn tree() -> DocumentTree {
        DocumentTree::new(
            "handbook",
            9,
            vec![
                node("0000", "Introduction", "What the product does", 1, 2),
                node("0001", "Pricing Model", "Tiers and discounts", 3, 5),
                node("0002", "Support", "Contact channels", 6, 9),
            ],
        )
    }

    fn search_config() -> SearchConfig {
        SearchConfig::default()
    }

    #[tokio::test]
    async fn test_reasoning_search_resolves_nodes() {
        let provider = provider(Arc::new(ScriptedBackend::constant(
            r#"{"thinking": "pricing lives in 0001", "node_list": ["0001", "0001", "9999", 2]}"#,
        )));
        let tree = tree();

        let result = search_tree(&provider, &search_config(), (&tree).into(), "How much?", None)
            .await
            .unwrap();

        assert_eq!(result.method, SearchMethod::Reasoning);
        assert_eq!(result.node_ids, vec!["0001", "0002"]);
        assert_eq!(result.thinking, "pricing lives in 0001");
        assert_eq!(
            result.context,
            "Section: Pricing Model\nTiers and discounts\n\nSection: Support\nContact channels"
        );
        assert_eq!(result.sources[0].pages, "3-5");
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_keywords() {
        let provider = provider(Arc::new(ScriptedBackend::failing()));
        let tree = tree();

        let result = TreeSearch::new(&provider, search_config())
            .search(&tree, "pricing", Some(5))
            .await
            .unwrap();

        assert_eq!(result.method, SearchMethod::KeywordFallback);
        assert_eq!(result.node_ids, vec!["0001"]);
        assert_eq!(result.keyword_scores, vec![2]);
        assert_eq!(
            result.sources,
            vec![Source {
                node_id: "0001".to_string(),
                title: "Pricing Model".to_string(),
                pages: "3-5".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_garbage_reply_and_hallucinated_ids_fall_back() {
        let tree = tree();
        let garbage = provider(Arc::new(ScriptedBackend::constant("no idea")));
        let result = TreeSearch::new(&garbage, search_config())
            .search(&tree, "support", None)
            .await
            .unwrap();
        assert_eq!(result.method, SearchMethod::KeywordFallback);

        let hallucinating = provider(Arc::new(ScriptedBackend::new(|_| {
            Ok(reply(r#"{"thinking": "", "node_list": ["0042"]}"#))
        })));
        let result = TreeSearch::new(&hallucinating, search_config())
            .search(&tree, "support", None)
            .await
            .unwrap();
        assert_eq!(result.method, SearchMethod::KeywordFallback);
        assert_eq!(result.node_ids, vec!["0002"]);
    }

    #[tokio::test]
    async fn test_empty_tree_and_empty_query() {
        let backend = Arc::new(ScriptedBackend::constant("{}"));
        let provider = provider(backend.clone());
        let search = TreeSearch::new(&provider, search_config());

        let empty = DocumentTree::new("blank", 0, Vec::new());
        let result = search.search(&empty, "anything", None).await.unwrap();
        assert!(result.is_empty());
        assert!(result.sources.is_empty());
        assert_eq!(result.method, SearchMethod::EmptyTree);

        assert!(matches!(
            search.search(&tree(), "   ", None).await,
            Err(Error::InvalidQuery(_))
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_results_capped_at_max_nodes() {
        let provider = provider(Arc::new(ScriptedBackend::constant(
            r#"{"thinking": "all", "node_list": ["0000", "0001", "0002"]}"#,
        )));
        let result = TreeSearch::new(&provider, search_config())
            .search(&tree(), "everything", Some(2))
            .await
            .unwrap();
        assert_eq!(result.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_search_from_artifact_without_ids() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("plain_structure.json");
        let mut tree = tree();
        tree.for_each_mut(|n| n.node_id = None);
        store::write_index(&path, &tree).await.unwrap();

        let provider = provider(Arc::new(ScriptedBackend::constant(
            r#"{"thinking": "", "node_list": ["0002"]}"#,
        )));
        let result = search_tree(&provider, &search_config(), path.as_path().into(), "help", None)
            .await
            .unwrap();
        assert_eq!(result.nodes[0].title, "Support");
    }
}
