use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DateFilter, LinkType, MemoryType};

/// A directed link row; bidirectional connections store two of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLink {
    pub id: i64,
    pub source_memory_id: i64,
    pub target_memory_id: i64,
    pub link_type: LinkType,
    pub relevance_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A link row expanded with the connected memory's details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedMemory {
    pub id: i64,
    pub memory_id: i64,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub link_type: LinkType,
    pub relevance_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated outcome of a batch link creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchLinkOutcome {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// A node in the materialized graph view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub connection_count: i64,
}

/// An undirected edge in the graph view; bidirectional pairs are deduped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
    pub link_type: LinkType,
    pub relevance_score: Option<f64>,
}

/// Materialized, filtered graph view handed to analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphEdge>,
    pub total_nodes: usize,
    pub total_links: usize,
}

/// Filters for materializing the graph view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphFilter {
    pub memory_type: Option<MemoryType>,
    pub date_range: Option<DateFilter>,
    pub include_isolated: bool,
    pub limit: Option<usize>,
}

impl GraphFilter {
    pub fn all() -> Self {
        GraphFilter {
            include_isolated: true,
            ..GraphFilter::default()
        }
    }
}

/// Daily link-creation count for growth metrics, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTimelineEntry {
    pub date: String,
    pub count: i64,
}
