use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::MemoryType;

/// How a search result was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Found via vector similarity only
    Vector,
    /// Found via full-text search only
    Keyword,
    /// Present in both ranked lists; RRF scores summed
    Hybrid,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Vector => "vector",
            MatchType::Keyword => "keyword",
            MatchType::Hybrid => "hybrid",
        }
    }
}

/// One fused search result row.
///
/// `distance` is the cosine distance to the query embedding; keyword-only
/// rows without an embedding carry the 1.0 sentinel. `rrf_score` is the
/// Reciprocal Rank Fusion score with k = 60.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    pub distance: Option<f64>,
    pub rrf_score: f64,
    pub match_type: MatchType,
}

/// Standard RRF constant; `score = 1 / (60 + rank)` per list.
pub const RRF_K: f64 = 60.0;
