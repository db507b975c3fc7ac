//! Search and ask command implementation

use crate::config::Config;
use crate::error::Result;
use crate::llm::CompletionProvider;
use crate::meta::MetaDb;
use crate::search::{answer_question, search_tree, Answer, SearchMethod, SearchResult, TreeSource};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve a command-line target to an index artifact.
///
/// An existing file is used as is; anything else is looked up as a document
/// id, which must be ready.
pub async fn resolve_index_path(db: &MetaDb, target: &str) -> Result<PathBuf> {
    let path = Path::new(target);
    if path.is_file() {
        debug!("Using index artifact {:?}", path);
        return Ok(path.to_path_buf());
    }
    db.ready_index_path(target).await
}

/// Search one document's tree
pub async fn cmd_search(
    config: &Config,
    db: &MetaDb,
    provider: &CompletionProvider,
    target: &str,
    query: &str,
    limit: Option<usize>,
) -> Result<SearchResult> {
    info!("Searching {}: {}", target, query);
    let index_path = resolve_index_path(db, target).await?;
    search_tree(
        provider,
        &config.search,
        TreeSource::Path(&index_path),
        query,
        limit,
    )
    .await
}

/// Search, then answer from the selected sections
pub async fn cmd_ask(
    config: &Config,
    db: &MetaDb,
    provider: &CompletionProvider,
    target: &str,
    question: &str,
) -> Result<Answer> {
    let result = cmd_search(config, db, provider, target, question, None).await?;
    Ok(answer_question(provider, question, &result).await)
}

fn method_label(method: SearchMethod) -> &'static str {
    match method {
        SearchMethod::Reasoning => "tree reasoning",
        SearchMethod::KeywordFallback => "keyword fallback",
        SearchMethod::EmptyTree => "empty tree",
    }
}

/// Print search results to console
pub fn print_search_result(result: &SearchResult) {
    println!("\n🔍 Query: {}\n", result.query);
    println!("Method: {}", method_label(result.method));
    if !result.thinking.is_empty() {
        println!("Reasoning: {}\n", result.thinking.trim());
    }

    if result.is_empty() {
        println!("No matching sections.");
        return;
    }

    println!("Found {} sections:\n", result.nodes.len());
    for (i, node) in result.nodes.iter().enumerate() {
        match result.keyword_scores.get(i) {
            Some(score) => println!(
                "{}. [{}] {} (pages {}, score {})",
                i + 1,
                node.id(),
                node.title,
                node.pages_label(),
                score
            ),
            None => println!(
                "{}. [{}] {} (pages {})",
                i + 1,
                node.id(),
                node.title,
                node.pages_label()
            ),
        }

        if let Some(summary) = node.summary.as_deref().filter(|s| !s.is_empty()) {
            let preview: String = summary.chars().take(200).collect();
            let ellipsis = if summary.chars().count() > 200 { "..." } else { "" };
            println!("   {}{}\n", preview.trim().replace('\n', " "), ellipsis);
        } else {
            println!();
        }
    }
}

/// Print an answer to console
pub fn print_answer(answer: &Answer) {
    println!("\n❓ {}\n", answer.question);
    println!("{}\n", answer.answer);

    if !answer.sources.is_empty() {
        println!("Sources ({}):", method_label(answer.method));
        for source in &answer.sources {
            println!("  • {} (pages {})", source.title, source.pages);
        }
    }
}
