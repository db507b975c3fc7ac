//! Answer generation over a search result

use super::{SearchMethod, SearchResult, Source};
use crate::llm::CompletionProvider;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A generated answer with the sections it was based on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub reasoning: String,
    pub sources: Vec<Source>,
    pub method: SearchMethod,
}

fn context_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the user's question using the following context from the document.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Give a precise and complete answer based on the context. \
         If the context is not sufficient, say so."
    )
}

/// One completion over the search context.
///
/// Without context the question is asked on its own. A failed completion
/// yields an apology instead of an error.
pub async fn answer_question(provider: &CompletionProvider, query: &str, result: &SearchResult) -> Answer {
    let prompt = if result.context.trim().is_empty() {
        format!("Answer the question: {}", query)
    } else {
        context_prompt(&result.context, query)
    };

    let completion = provider.complete_with_finish_reason(None, &prompt, &[]).await;
    let answer = match completion.text() {
        Some(text) => text.trim().to_string(),
        None => {
            warn!("Answer generation failed after {} attempts", completion.attempts);
            format!(
                "Sorry, an error occurred while generating the answer: the model did not respond after {} attempts.",
                completion.attempts
            )
        }
    };

    Answer {
        question: query.to_string(),
        answer,
        reasoning: result.thinking.clone(),
        sources: result.sources.clone(),
        method: result.method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{provider, ScriptedBackend};
    use crate::tree::SectionNode;
    use std::sync::Arc;

    fn result(with_context: bool) -> SearchResult {
        let mut node = SectionNode::new("Pricing Model", 3, 5);
        node.node_id = Some("0001".to_string());
        node.summary = Some("Tiers cost 10 and 20.".to_string());
        let nodes = if with_context { vec![node] } else { Vec::new() };
        SearchResult::from_nodes(
            "How much?",
            SearchMethod::Reasoning,
            "pricing section".to_string(),
            nodes,
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_answer_uses_context() {
        let backend = Arc::new(ScriptedBackend::constant(" It costs 10. "));
        let provider = provider(backend.clone());

        let answer = answer_question(&provider, "How much?", &result(true)).await;
        assert_eq!(answer.answer, "It costs 10.");
        assert_eq!(answer.sources[0].node_id, "0001");
        assert_eq!(answer.reasoning, "pricing section");
        assert!(backend.requests()[0].prompt().contains("Section: Pricing Model"));
    }

    #[tokio::test]
    async fn test_answer_without_context_asks_plainly() {
        let backend = Arc::new(ScriptedBackend::constant("No idea."));
        let provider = provider(backend.clone());

        answer_question(&provider, "How much?", &result(false)).await;
        assert_eq!(backend.requests()[0].prompt(), "Answer the question: How much?");
    }

    #[tokio::test]
    async fn test_failed_answer_is_explained() {
        let provider = provider(Arc::new(ScriptedBackend::failing()));
        let answer = answer_question(&provider, "How much?", &result(true)).await;
        assert!(answer.answer.starts_with("Sorry"));
        assert_eq!(answer.sources.len(), 1);
    }
}
