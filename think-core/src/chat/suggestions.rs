//! Quick-prompt suggestions for the chat surface.
//!
//! Two fixed special prompts plus a few dynamic ones derived from recent
//! memories and popular tags, cached process-wide for five minutes.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::storage::MemoryStore;
use crate::types::{DateFilter, MemoryQuery};

const CACHE_TTL: Duration = Duration::from_secs(300);
const MAX_PROMPTS: usize = 5;

/// A suggested prompt shown before the user types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickPrompt {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub prompt_type: QuickPromptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickPromptType {
    Special,
    Dynamic,
}

fn special_prompts() -> Vec<QuickPrompt> {
    vec![
        QuickPrompt {
            id: "recent-summary".to_string(),
            text: "Summarize what I learned recently".to_string(),
            prompt_type: QuickPromptType::Special,
            handler: Some("recent_memories".to_string()),
            source: None,
        },
        QuickPrompt {
            id: "find-connections".to_string(),
            text: "What connections exist between my memories?".to_string(),
            prompt_type: QuickPromptType::Special,
            handler: Some("recent_connections".to_string()),
            source: None,
        },
    ]
}

/// Mutex-guarded TTL cache for quick prompts.
pub struct SuggestionsCache {
    state: Mutex<Option<(Instant, Vec<QuickPrompt>)>>,
}

impl Default for SuggestionsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionsCache {
    pub fn new() -> Self {
        SuggestionsCache {
            state: Mutex::new(None),
        }
    }

    fn get(&self) -> Option<Vec<QuickPrompt>> {
        let guard = self.state.lock();
        guard.as_ref().and_then(|(cached_at, prompts)| {
            (cached_at.elapsed() < CACHE_TTL).then(|| prompts.clone())
        })
    }

    fn set(&self, prompts: Vec<QuickPrompt>) {
        *self.state.lock() = Some((Instant::now(), prompts));
    }

    /// Drop cached prompts, e.g. after memories change.
    pub fn clear(&self) {
        *self.state.lock() = None;
    }
}

/// Build the quick prompt list: 2 special, up to 2 recent-topic prompts, and
/// up to 1 popular-tag prompt, 5 total.
pub async fn get_quick_prompts(
    store: &dyn MemoryStore,
    cache: &SuggestionsCache,
) -> Vec<QuickPrompt> {
    if let Some(cached) = cache.get() {
        return cached;
    }

    let mut prompts = special_prompts();

    if let Err(e) = add_dynamic_prompts(store, &mut prompts).await {
        warn!("Failed to generate dynamic prompts: {e}");
    }

    prompts.truncate(MAX_PROMPTS);
    cache.set(prompts.clone());
    prompts
}

async fn add_dynamic_prompts(
    store: &dyn MemoryStore,
    prompts: &mut Vec<QuickPrompt>,
) -> crate::Result<()> {
    let (recent, _) = store
        .list_memories(MemoryQuery {
            limit: 10,
            date_filter: Some(DateFilter::Week),
            ..MemoryQuery::default()
        })
        .await?;

    // Topic prompts from memories with substantive titles
    let good_titles = recent
        .iter()
        .filter_map(|m| m.title.as_deref().map(|t| (m.id, t)))
        .filter(|(_, t)| t.len() > 15)
        .take(2);
    for (id, title) in good_titles {
        let title = if title.len() > 50 {
            let mut end = 47;
            while end > 0 && !title.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &title[..end])
        } else {
            title.to_string()
        };
        prompts.push(QuickPrompt {
            id: format!("topic-{id}"),
            text: format!("Tell me about {title}"),
            prompt_type: QuickPromptType::Dynamic,
            handler: None,
            source: Some("recent_memory".to_string()),
        });
    }

    // One tag prompt from tags used at least twice
    let tags = store.all_tags().await?;
    if let Some(tag) = tags.iter().find(|t| t.usage_count >= 2) {
        prompts.push(QuickPrompt {
            id: format!("tag-{}", tag.name),
            text: format!("What have I saved about {}?", tag.name),
            prompt_type: QuickPromptType::Dynamic,
            handler: None,
            source: Some("popular_tag".to_string()),
        });
    }

    Ok(())
}
