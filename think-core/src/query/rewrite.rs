//! Follow-up query rewriting.
//!
//! Vague follow-ups ("tell me more about that") retrieve nothing useful.
//! When the message looks context-dependent, a constrained LLM call rewrites
//! it into a self-contained query using the recent conversation.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::llm::{parse, LlmGateway};
use crate::types::{ChatTurn, Role};
use crate::Result;

/// Patterns indicating context-dependent follow-ups.
static FOLLOWUP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(this|that|these|those|it)\b",
        r"(?i)\b(the same|mentioned|discussed)\b",
        r"(?i)^(and|also|plus)\b",
        r"(?i)\b(more|else|another)\b.*\b(about|on)\b",
        r"(?i)^(explain|elaborate|expand|clarify)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Number of history turns handed to the rewrite prompt.
const REWRITE_HISTORY_TURNS: usize = 4;

/// Detect whether the query needs context from the conversation.
pub fn needs_rewriting(query: &str, history: &[ChatTurn]) -> bool {
    if history.is_empty() {
        return false;
    }

    let query = query.trim();

    // Short queries with history are likely follow-ups
    if query.len() < 25 && history.len() >= 2 {
        return true;
    }

    if FOLLOWUP_PATTERNS.iter().any(|p| p.is_match(query)) {
        return true;
    }

    // Queries that yield at most one keyword need context too
    let keywords = super::extract_keywords(query);
    if keywords.split(" OR ").count() <= 1 && history.len() >= 2 {
        return true;
    }

    false
}

fn format_history(history: &[ChatTurn]) -> String {
    let start = history.len().saturating_sub(REWRITE_HISTORY_TURNS);
    history[start..]
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let content: String = if turn.content.len() > 500 {
                let mut end = 500;
                while end > 0 && !turn.content.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &turn.content[..end])
            } else {
                turn.content.clone()
            };
            format!("{role}: {content}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite a vague query using conversation context. Falls back to the
/// original query on any provider failure.
pub async fn rewrite_query(
    gateway: &LlmGateway,
    query: &str,
    history: &[ChatTurn],
) -> Result<String> {
    if history.is_empty() {
        return Ok(query.to_string());
    }

    let history_text = format_history(history);
    let prompt = format!(
        "Given this conversation:\n{history_text}\n\nThe user now asks: \"{query}\"\n\n\
         Rewrite this query to be self-contained for searching a knowledge base.\n\
         - Replace pronouns (this, that, it) with actual topics\n\
         - Include key terms from the conversation\n\
         - Keep it under 50 words\n\
         - Output ONLY the rewritten query\n\nRewritten query:"
    );

    let raw = gateway
        .complete(
            "Rewrite follow-up questions to be self-contained for search. Be concise. Output only the rewritten query.",
            &prompt,
            100,
            Some(0.3),
        )
        .await?;

    let mut rewritten = parse::strip_quotes(&raw).to_string();
    if rewritten.to_lowercase().starts_with("rewritten query:") {
        rewritten = rewritten["rewritten query:".len()..].trim().to_string();
    }
    if rewritten.is_empty() {
        return Ok(query.to_string());
    }

    info!("Query rewritten: '{query}' -> '{rewritten}'");
    Ok(rewritten)
}

/// Rewrite when needed; returns `(query, was_rewritten)`.
pub async fn maybe_rewrite_query(
    gateway: &LlmGateway,
    query: &str,
    history: &[ChatTurn],
) -> (String, bool) {
    if !needs_rewriting(query, history) {
        return (query.to_string(), false);
    }
    match rewrite_query(gateway, query, history).await {
        Ok(rewritten) => (rewritten, true),
        Err(e) => {
            warn!("Query rewrite failed: {e}");
            (query.to_string(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(turns: usize) -> Vec<ChatTurn> {
        (0..turns)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("question number {i} about distributed systems"))
                } else {
                    ChatTurn::assistant(format!("long-form answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn no_history_never_rewrites() {
        assert!(!needs_rewriting("tell me more about that", &[]));
    }

    #[test]
    fn short_queries_with_history_rewrite() {
        assert!(needs_rewriting("why?", &history(2)));
    }

    #[test]
    fn demonstrative_pronouns_trigger() {
        assert!(needs_rewriting(
            "can you compare that approach with event sourcing patterns",
            &history(1)
        ));
    }

    #[test]
    fn continuations_trigger() {
        assert!(needs_rewriting(
            "and what about the consistency guarantees involved",
            &history(1)
        ));
    }

    #[test]
    fn self_contained_queries_do_not_trigger() {
        assert!(!needs_rewriting(
            "summarize consensus algorithms paxos raft comparison tradeoffs",
            &history(1)
        ));
    }

    #[test]
    fn history_formatting_truncates_long_turns() {
        let history = vec![ChatTurn::assistant("y".repeat(800))];
        let formatted = format_history(&history);
        assert!(formatted.starts_with("Assistant: "));
        assert!(formatted.ends_with("..."));
        assert!(formatted.len() < 600);
    }
}
