//! Defensive parsing of LLM output: models wrap answers in code fences,
//! quotes, and labels no matter how firmly the prompt forbids it.

use regex::Regex;
use std::sync::LazyLock;

/// Strip a surrounding markdown code fence, including an optional language
/// tag on the opening fence.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() > 2 {
        return lines[1..lines.len() - 1].join("\n").trim().to_string();
    }
    let inner = trimmed.trim_matches('`');
    inner.strip_prefix("json").unwrap_or(inner).trim().to_string()
}

/// Strip one pair of surrounding quotes.
pub fn strip_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        if (bytes[0] == b'"' && bytes[trimmed.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[trimmed.len() - 1] == b'\'')
        {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Clean a generated title: trim, drop wrapping quotes.
pub fn clean_title(raw: &str) -> String {
    strip_quotes(raw).trim().to_string()
}

/// Parse a JSON array of tag strings; anything else yields an empty list.
/// Tags are lowercased, trimmed, and capped at 5.
pub fn parse_tag_array(raw: &str) -> Vec<String> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<serde_json::Value>(&cleaned) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_lowercase()))
            .filter(|s| !s.is_empty())
            .take(5)
            .collect(),
        _ => Vec::new(),
    }
}

static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"["']?([^"'\n]+\?)["']?"#).expect("static question pattern compiles")
});

/// Parse follow-up suggestions: a JSON array of question strings, with a
/// regex fallback that scrapes lines ending in `?` from free-form output.
pub fn parse_followups(raw: &str) -> Vec<String> {
    let cleaned = strip_code_fences(raw);

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(&cleaned)
    {
        let parsed: Vec<String> = items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .take(3)
            .collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }

    QUESTION_RE
        .captures_iter(&cleaned)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|q| q.len() > 10)
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_removed() {
        assert_eq!(
            strip_code_fences("```json\n[\"a\", \"b\"]\n```"),
            "[\"a\", \"b\"]"
        );
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn quotes_are_removed_once() {
        assert_eq!(strip_quotes("\"Hello\""), "Hello");
        assert_eq!(strip_quotes("\"Nested \"inner\" quotes\""), "Nested \"inner\" quotes");
        assert_eq!(strip_quotes("no quotes"), "no quotes");
    }

    #[test]
    fn tags_parse_from_json_array() {
        assert_eq!(
            parse_tag_array("[\"Rust\", \" async \", \"\"]"),
            vec!["rust".to_string(), "async".to_string()]
        );
        assert!(parse_tag_array("not json").is_empty());
        assert!(parse_tag_array("{\"a\": 1}").is_empty());
    }

    #[test]
    fn tags_are_capped_at_five() {
        let raw = "[\"a1\",\"b2\",\"c3\",\"d4\",\"e5\",\"f6\"]";
        assert_eq!(parse_tag_array(raw).len(), 5);
    }

    #[test]
    fn followups_fall_back_to_question_scrape() {
        let raw = "Here are ideas:\n1. What about error handling in Rust?\n2. How does ownership work here?";
        let followups = parse_followups(raw);
        assert_eq!(followups.len(), 2);
        assert!(followups[0].ends_with('?'));
    }

    #[test]
    fn followups_parse_json_first() {
        let raw = "```json\n[\"What is RRF?\", \"How are links stored?\"]\n```";
        assert_eq!(parse_followups(raw).len(), 2);
    }
}
