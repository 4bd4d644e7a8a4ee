//! Distance-based retrieval filtering and context assembly.
//!
//! Different embedding models produce different cosine-distance
//! distributions, so the filter picks thresholds per model and adapts how
//! many results to keep to the quality of the best match.

use tracing::{debug, info};

use crate::types::SearchHit;

/// Distance tiers for one embedding model.
#[derive(Debug, Clone, Copy)]
pub struct ModelThresholds {
    pub excellent: f64,
    pub good: f64,
    pub cutoff: f64,
}

const MODEL_THRESHOLDS: &[(&str, ModelThresholds)] = &[
    (
        "ollama:mxbai-embed-large",
        ModelThresholds {
            excellent: 0.25,
            good: 0.35,
            cutoff: 0.45,
        },
    ),
    (
        "ollama:snowflake-arctic-embed",
        ModelThresholds {
            excellent: 0.25,
            good: 0.35,
            cutoff: 0.45,
        },
    ),
    (
        "openai:text-embedding-3-small",
        ModelThresholds {
            excellent: 0.40,
            good: 0.50,
            cutoff: 0.60,
        },
    ),
    (
        "openai:text-embedding-3-large",
        ModelThresholds {
            excellent: 0.28,
            good: 0.38,
            cutoff: 0.48,
        },
    ),
];

const DEFAULT_THRESHOLDS: ModelThresholds = ModelThresholds {
    excellent: 0.25,
    good: 0.35,
    cutoff: 0.45,
};

/// Thresholds for an embedding identifier, defaulting when unknown.
pub fn thresholds_for_model(embedding_model: Option<&str>) -> ModelThresholds {
    embedding_model
        .and_then(|model| {
            MODEL_THRESHOLDS
                .iter()
                .find(|(id, _)| *id == model)
                .map(|(_, t)| *t)
        })
        .unwrap_or(DEFAULT_THRESHOLDS)
}

/// Filter candidates by distance to the best match.
///
/// The best distance decides the tier: excellent matches keep everything
/// within +0.08 (cap 5), good within +0.06 (cap 3), marginal within +0.04
/// (cap 2). A best distance at or past the cutoff empties the result.
pub fn filter_hits_dynamically(
    mut hits: Vec<SearchHit>,
    embedding_model: Option<&str>,
) -> Vec<SearchHit> {
    if hits.is_empty() {
        debug!("No candidates to filter");
        return hits;
    }

    let thresholds = thresholds_for_model(embedding_model);
    hits.sort_by(|a, b| {
        let da = a.distance.unwrap_or(999.0);
        let db = b.distance.unwrap_or(999.0);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });

    let best_distance = match hits.first().and_then(|h| h.distance) {
        Some(d) if d < thresholds.cutoff => d,
        best => {
            info!(
                "Best match too distant ({best:?} >= {}), returning empty",
                thresholds.cutoff
            );
            return Vec::new();
        }
    };

    let (threshold, max_results) = if best_distance < thresholds.excellent {
        (best_distance + 0.08, 5)
    } else if best_distance < thresholds.good {
        (best_distance + 0.06, 3)
    } else {
        (best_distance + 0.04, 2)
    };

    debug!("Best distance {best_distance:.3}, threshold {threshold:.3}, max {max_results}");

    hits.retain(|h| h.distance.is_some_and(|d| d <= threshold));
    hits.truncate(max_results);
    info!("Filtered to {} memories", hits.len());
    hits
}

/// Character budget for assembled context.
pub const DEFAULT_CONTEXT_BUDGET: usize = 8000;

/// Per-memory content cap inside the context.
const CONTENT_CAP: usize = 2000;

/// Format filtered memories into the LLM context string.
///
/// Each entry is `### {title}\n{content}` with content capped at 2000 chars;
/// entries are separated by `---` and assembly stops before the first entry
/// that would overflow the budget.
pub fn format_hits_as_context(hits: &[SearchHit], max_chars: usize) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut parts = Vec::new();
    let mut total = 0_usize;

    for hit in hits {
        let title = hit.title.as_deref().unwrap_or("Untitled");
        let content = hit.content.as_deref().unwrap_or("");
        let content = if content.len() > CONTENT_CAP {
            let mut end = CONTENT_CAP;
            while end > 0 && !content.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &content[..end])
        } else {
            content.to_string()
        };

        let entry = format!("### {title}\n{content}");
        if total + entry.len() > max_chars {
            break;
        }
        total += entry.len();
        parts.push(entry);
    }

    if parts.is_empty() {
        return String::new();
    }
    format!("## Relevant Memories:\n\n{}", parts.join("\n\n---\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchType, MemoryType};
    use chrono::Utc;

    fn hit(id: i64, distance: Option<f64>) -> SearchHit {
        SearchHit {
            id,
            title: Some(format!("Memory {id}")),
            content: Some("content".to_string()),
            url: None,
            summary: None,
            memory_type: MemoryType::Web,
            created_at: Utc::now(),
            distance,
            rrf_score: 0.016,
            match_type: MatchType::Vector,
        }
    }

    #[test]
    fn distant_best_match_empties_results() {
        let hits = vec![hit(1, Some(0.5)), hit(2, Some(0.6))];
        assert!(filter_hits_dynamically(hits, None).is_empty());
    }

    #[test]
    fn excellent_match_keeps_up_to_five_within_window() {
        let hits = vec![
            hit(1, Some(0.10)),
            hit(2, Some(0.12)),
            hit(3, Some(0.17)),
            hit(4, Some(0.19)), // outside 0.10 + 0.08
            hit(5, Some(0.30)),
        ];
        let filtered = filter_hits_dynamically(hits, None);
        assert_eq!(
            filtered.iter().map(|h| h.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn marginal_match_caps_at_two() {
        let hits = vec![hit(1, Some(0.40)), hit(2, Some(0.41)), hit(3, Some(0.42))];
        let filtered = filter_hits_dynamically(hits, None);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn model_specific_cutoff_applies() {
        // 0.5 is past the default cutoff but fine for 3-small
        let hits = vec![hit(1, Some(0.55))];
        assert!(filter_hits_dynamically(hits.clone(), None).is_empty());
        assert_eq!(
            filter_hits_dynamically(hits, Some("openai:text-embedding-3-small")).len(),
            1
        );
    }

    #[test]
    fn hits_without_distance_are_dropped() {
        let hits = vec![hit(1, Some(0.1)), hit(2, None)];
        let filtered = filter_hits_dynamically(hits, None);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn context_respects_budget() {
        let hits: Vec<SearchHit> = (0..10)
            .map(|i| {
                let mut h = hit(i, Some(0.1));
                h.content = Some("x".repeat(1500));
                h
            })
            .collect();
        let context = format_hits_as_context(&hits, 4000);
        assert!(context.starts_with("## Relevant Memories:"));
        assert!(context.len() <= 4000 + 100);
        // Budget fits two 1500-char entries, not three
        assert_eq!(context.matches("### Memory").count(), 2);
    }

    #[test]
    fn long_content_is_capped() {
        let mut h = hit(1, Some(0.1));
        h.content = Some("y".repeat(5000));
        let context = format_hits_as_context(&[h], DEFAULT_CONTEXT_BUDGET);
        assert!(context.contains("..."));
        assert!(context.len() < 2200);
    }

    #[test]
    fn empty_input_yields_empty_context() {
        assert!(format_hits_as_context(&[], DEFAULT_CONTEXT_BUDGET).is_empty());
    }
}
