//! Query preprocessing for improved memory retrieval.
//!
//! Question-style queries embed poorly against statement-style memory
//! content, so a rule set strips the question scaffolding before embedding,
//! and a stopword filter turns the raw query into an FTS5 keyword
//! expression.

pub mod rewrite;

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Question patterns to transform; more specific patterns come first.
static QUESTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let sources: &[(&str, &str)] = &[
        // "What did I save/have about X?" -> "X"
        (
            r"(?i)^what (?:do i|did i|have i) (?:have|save|store|keep|saved|stored) (?:about|on|regarding|for) (.+?)\??$",
            "$1",
        ),
        // "What is/are X?" -> "X"
        (r"(?i)^what (?:is|are|was|were) (.+?)\??$", "$1"),
        // "How do/does/can/to X?" -> "X"
        (r"(?i)^how (?:do|does|did|can|could|to|should) (.+?)\??$", "$1"),
        // "Show me/find/search X" -> "X"
        (
            r"(?i)^(?:show me|find|search|search for|look for|get) (?:my )?(?:memories? )?(?:about |on |regarding |for )?(.+?)\??$",
            "$1",
        ),
        // "Anything/something about X" -> "X"
        (
            r"(?i)^(?:anything|something|everything) (?:about|on|regarding|for) (.+?)\??$",
            "$1",
        ),
        // "Do I have anything about X?" -> "X"
        (
            r"(?i)^do i have (?:anything|something|any|a) (?:about|on|regarding|for|saved about) (.+?)\??$",
            "$1",
        ),
        // "Tell me about X" -> "X"
        (r"(?i)^(?:tell me|remind me) (?:about|of) (.+?)\??$", "$1"),
        // "Where did I read about X?" -> "X"
        (
            r"(?i)^where (?:did i|have i) (?:read|see|find|save) (?:about|that) (.+?)\??$",
            "$1",
        ),
    ];
    sources
        .iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, *replacement))
        })
        .collect()
});

/// Stop words dropped during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "what", "did", "do", "does", "i", "have", "save", "saved", "about", "the", "a", "an", "is",
    "are", "was", "were", "my", "me", "show", "find", "search", "for", "on", "in", "to", "of",
    "and", "or", "how", "where", "when", "why", "can", "could", "would", "should", "tell",
    "anything", "something", "everything", "any", "some", "get", "look", "remind", "read", "see",
    "that", "this", "with", "from", "it", "be",
];

/// Transform a question-style query into statement style for embedding.
///
/// Unknown shapes pass through unchanged.
pub fn preprocess_query(query: &str) -> String {
    let stripped = query.trim();

    for (pattern, replacement) in QUESTION_PATTERNS.iter() {
        if pattern.is_match(stripped) {
            let result = pattern.replace(stripped, *replacement).trim().to_string();
            debug!("Query transformed: '{stripped}' -> '{result}'");
            return result;
        }
    }

    debug!("Query unchanged: '{stripped}'");
    stripped.to_string()
}

/// Extract keywords for FTS5 matching as an `OR` expression.
///
/// Lowercases, strips punctuation, drops stop words and tokens of 2 chars or
/// fewer. Falls back to the short tokens when nothing survives, and to the
/// raw query when there are no tokens at all.
pub fn extract_keywords(query: &str) -> String {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let mut keywords: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !STOP_WORDS.contains(w) && w.len() > 2)
        .collect();

    if keywords.is_empty() {
        keywords = words.iter().copied().filter(|w| w.len() > 2).collect();
    }

    if keywords.is_empty() {
        return query.to_string();
    }
    keywords.join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_scaffolding_is_stripped() {
        assert_eq!(
            preprocess_query("What did I save about React hooks?"),
            "React hooks"
        );
        assert_eq!(preprocess_query("How does async await work?"), "async await work");
        assert_eq!(preprocess_query("Tell me about Rust lifetimes"), "Rust lifetimes");
        assert_eq!(
            preprocess_query("Show me my notes on Python"),
            "notes on Python"
        );
    }

    #[test]
    fn statements_pass_through() {
        assert_eq!(preprocess_query("React tutorial"), "React tutorial");
        assert_eq!(preprocess_query("  padded  "), "padded");
    }

    #[test]
    fn keywords_become_or_expression() {
        assert_eq!(
            extract_keywords("What did I save about React hooks?"),
            "react OR hooks"
        );
        assert_eq!(
            extract_keywords("the quick brown fox"),
            "quick OR brown OR fox"
        );
    }

    #[test]
    fn keyword_fallback_keeps_short_content_words() {
        // Every token is a stop word or too short, so the length filter
        // alone applies
        assert_eq!(extract_keywords("did the an"), "did OR the");
    }

    #[test]
    fn empty_query_is_returned_verbatim() {
        assert_eq!(extract_keywords("!!"), "!!");
    }
}
