//! Special prompts that bypass embedding search.
//!
//! Generic questions like "summarize what I learned recently" carry no
//! useful semantic content, so they are matched by substring and answered
//! from date-based retrieval instead.

use tracing::error;

use crate::storage::MemoryStore;
use crate::types::{DateFilter, MemoryQuery, MemorySummary, RetrievedSource};
use crate::Result;

/// Recognized special handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialHandler {
    RecentMemories,
    RecentConnections,
}

impl SpecialHandler {
    pub fn name(&self) -> &'static str {
        match self {
            SpecialHandler::RecentMemories => "recent_memories",
            SpecialHandler::RecentConnections => "recent_connections",
        }
    }
}

const RECENT_PHRASES: &[&str] = &[
    "summarize what i learned recently",
    "what did i learn recently",
    "summarize my recent",
    "what have i learned lately",
    "recent learnings",
    "summarize what i saved recently",
];

const CONNECTION_PHRASES: &[&str] = &[
    "connections exist between",
    "what connections",
    "find connections",
    "how are my memories connected",
    "connections between my memories",
    "relate to each other",
];

/// Match a message against the special prompt phrases.
pub fn is_special_prompt(message: &str) -> Option<SpecialHandler> {
    let message = message.to_lowercase();
    let message = message.trim();

    if RECENT_PHRASES.iter().any(|p| message.contains(p)) {
        return Some(SpecialHandler::RecentMemories);
    }
    if CONNECTION_PHRASES.iter().any(|p| message.contains(p)) {
        return Some(SpecialHandler::RecentConnections);
    }
    None
}

fn sources_of(memories: &[MemorySummary]) -> Vec<RetrievedSource> {
    memories
        .iter()
        .map(|m| RetrievedSource {
            id: m.id,
            title: m.title.clone(),
            url: m.url.clone(),
            distance: None,
            match_type: None,
            rrf_score: None,
        })
        .collect()
}

fn format_section(memory: &MemorySummary, max_tags: Option<usize>) -> String {
    let title = memory.title.as_deref().unwrap_or("Untitled");
    let summary = memory.summary.as_deref().unwrap_or("");
    if memory.tags.is_empty() {
        return format!("### {title}\n{summary}");
    }

    let names: Vec<&str> = memory
        .tags
        .iter()
        .take(max_tags.unwrap_or(usize::MAX))
        .map(|t| t.name.as_str())
        .collect();
    match max_tags {
        // Inline bracket form for the recent-memories digest
        Some(_) => format!("### {title} [Tags: {}]\n{summary}", names.join(", ")),
        // Prominent tag line for connection finding
        None => format!("### {title}\nTags: {}\n{summary}", names.join(", ")),
    }
}

/// Execute a special handler, returning `(context, sources)`. Failures
/// degrade to an empty context so chat proceeds without RAG.
pub async fn execute_special_handler(
    store: &dyn MemoryStore,
    handler: SpecialHandler,
) -> (String, Vec<RetrievedSource>) {
    match run(store, handler).await {
        Ok(result) => result,
        Err(e) => {
            error!("Special handler {} failed: {e}", handler.name());
            (String::new(), Vec::new())
        }
    }
}

async fn run(
    store: &dyn MemoryStore,
    handler: SpecialHandler,
) -> Result<(String, Vec<RetrievedSource>)> {
    match handler {
        SpecialHandler::RecentMemories => {
            let (memories, _) = store
                .list_memories(MemoryQuery {
                    limit: 10,
                    date_filter: Some(DateFilter::Week),
                    ..MemoryQuery::default()
                })
                .await?;
            if memories.is_empty() {
                return Ok((String::new(), Vec::new()));
            }

            let sections: Vec<String> = memories
                .iter()
                .map(|m| format_section(m, Some(5)))
                .collect();
            let context = format!(
                "## Recent Memories (last 7 days):\n\n{}",
                sections.join("\n\n---\n\n")
            );
            Ok((context, sources_of(&memories)))
        }
        SpecialHandler::RecentConnections => {
            let (memories, _) = store
                .list_memories(MemoryQuery {
                    limit: 15,
                    date_filter: Some(DateFilter::Month),
                    ..MemoryQuery::default()
                })
                .await?;
            if memories.is_empty() {
                return Ok((String::new(), Vec::new()));
            }

            let sections: Vec<String> =
                memories.iter().map(|m| format_section(m, None)).collect();
            let context = format!(
                "## Your Memories (analyze for connections):\n\n{}",
                sections.join("\n\n---\n\n")
            );
            Ok((context, sources_of(&memories)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_prompts_match() {
        assert_eq!(
            is_special_prompt("Summarize what I learned recently"),
            Some(SpecialHandler::RecentMemories)
        );
        assert_eq!(
            is_special_prompt("please summarize what i saved recently, thanks"),
            Some(SpecialHandler::RecentMemories)
        );
    }

    #[test]
    fn connection_prompts_match() {
        assert_eq!(
            is_special_prompt("What connections exist between my memories?"),
            Some(SpecialHandler::RecentConnections)
        );
        assert_eq!(
            is_special_prompt("how are my memories connected"),
            Some(SpecialHandler::RecentConnections)
        );
    }

    #[test]
    fn ordinary_questions_do_not_match() {
        assert!(is_special_prompt("What did I save about React?").is_none());
        assert!(is_special_prompt("").is_none());
    }
}
