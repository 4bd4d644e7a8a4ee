//! Knowledge graph view, analytics, and caching.
//!
//! The graph view is materialized from the store per filter and cached in a
//! TTL-LRU keyed by the filter hash. Any link mutation clears the cache.

pub mod builder;
pub mod centrality;
pub mod communities;
pub mod insights;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, HubEvent};
use crate::storage::MemoryStore;
use crate::types::{BatchLinkOutcome, GraphData, GraphFilter, LinkType, MemoryLink};

use builder::MemoryGraph;

const GRAPH_CACHE_TTL: Duration = Duration::from_secs(300);
const GRAPH_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(100).unwrap();

/// All centrality metrics, node id to score.
#[derive(Debug, Clone, Serialize)]
pub struct CentralityMetrics {
    pub degree: HashMap<i64, f64>,
    pub betweenness: HashMap<i64, f64>,
    pub closeness: HashMap<i64, f64>,
    pub eigenvector: HashMap<i64, f64>,
}

/// Community detection output.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityReport {
    pub communities: Vec<Vec<i64>>,
    pub modularity: f64,
    pub num_communities: usize,
}

/// Graph-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStatistics {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_components: usize,
    pub density: f64,
    pub average_degree: f64,
    pub diameter: Option<usize>,
    pub clustering_coefficient: f64,
    pub type_distribution: HashMap<String, usize>,
    pub link_type_distribution: HashMap<String, usize>,
}

/// A shortest path with node titles expanded.
#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub path: Vec<i64>,
    pub length: usize,
    pub exists: bool,
    pub node_titles: Vec<String>,
}

/// Lazy analytics over one materialized graph view.
pub struct GraphAnalytics {
    data: GraphData,
    graph: MemoryGraph,
    centrality_cache: Option<CentralityMetrics>,
    communities_cache: Option<Vec<Vec<i64>>>,
    statistics_cache: Option<GraphStatistics>,
}

impl GraphAnalytics {
    pub fn new(data: GraphData) -> Self {
        let graph = MemoryGraph::build(&data);
        GraphAnalytics {
            data,
            graph,
            centrality_cache: None,
            communities_cache: None,
            statistics_cache: None,
        }
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    pub fn data(&self) -> &GraphData {
        &self.data
    }

    /// Compute (or reuse) all centrality metrics. Eigenvector falls back to
    /// degree when the power iteration does not converge.
    pub fn centrality_metrics(&mut self) -> &CentralityMetrics {
        if self.centrality_cache.is_none() {
            let degree = centrality::degree_centrality(&self.graph);
            let betweenness = centrality::betweenness_centrality(&self.graph);
            let closeness = centrality::closeness_centrality(&self.graph);
            let eigenvector = match centrality::eigenvector_centrality(&self.graph) {
                Some(scores) => scores,
                None => {
                    warn!("Eigenvector centrality failed to converge, falling back to degree");
                    degree.clone()
                }
            };
            self.centrality_cache = Some(CentralityMetrics {
                degree,
                betweenness,
                closeness,
                eigenvector,
            });
        }
        self.centrality_cache
            .as_ref()
            .unwrap_or_else(|| unreachable!("centrality cache populated above"))
    }

    /// Greedy-modularity communities with the partition quality score.
    pub fn communities(&mut self) -> CommunityReport {
        if self.communities_cache.is_none() {
            self.communities_cache =
                Some(communities::greedy_modularity_communities(&self.graph));
        }
        let communities = self.communities_cache.clone().unwrap_or_default();
        let modularity =
            (communities::modularity(&self.graph, &communities) * 10_000.0).round() / 10_000.0;
        CommunityReport {
            num_communities: communities.len(),
            communities,
            modularity,
        }
    }

    /// Graph statistics; diameter only for connected graphs.
    pub fn statistics(&mut self) -> GraphStatistics {
        if let Some(stats) = &self.statistics_cache {
            return stats.clone();
        }

        let graph = &self.graph;
        let num_nodes = graph.node_count();
        let num_edges = graph.edge_count();
        let components = graph.connected_components();

        let density = if num_nodes > 1 {
            let possible = num_nodes * (num_nodes - 1) / 2;
            (num_edges as f64 / possible as f64 * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };
        let average_degree = if num_nodes > 0 {
            ((2 * num_edges) as f64 / num_nodes as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        let diameter = (components.len() == 1 && num_nodes > 0).then(|| {
            graph
                .node_ids()
                .into_iter()
                .map(|id| graph.bfs_distances(id).values().copied().max().unwrap_or(0))
                .max()
                .unwrap_or(0)
        });

        let clustering_coefficient =
            (graph.average_clustering() * 10_000.0).round() / 10_000.0;

        let mut type_distribution: HashMap<String, usize> = HashMap::new();
        for node in &self.data.nodes {
            *type_distribution
                .entry(node.memory_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        let mut link_type_distribution: HashMap<String, usize> = HashMap::new();
        for link in &self.data.links {
            *link_type_distribution
                .entry(link.link_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        let stats = GraphStatistics {
            num_nodes,
            num_edges,
            num_components: components.len(),
            density,
            average_degree,
            diameter,
            clustering_coefficient,
            type_distribution,
            link_type_distribution,
        };
        self.statistics_cache = Some(stats.clone());
        stats
    }

    /// Shortest path(s) between two nodes. `None` when either node is
    /// missing; a non-existent path yields one result with `exists: false`.
    pub fn find_path(&self, source: i64, target: i64, all_paths: bool) -> Option<Vec<PathResult>> {
        if !self.graph.contains(source) || !self.graph.contains(target) {
            return None;
        }

        let titles = |path: &[i64]| -> Vec<String> {
            path.iter().map(|&id| self.graph.title(id)).collect()
        };

        if all_paths {
            let paths = self.graph.all_shortest_paths(source, target);
            if paths.is_empty() {
                return Some(vec![PathResult {
                    path: Vec::new(),
                    length: 0,
                    exists: false,
                    node_titles: Vec::new(),
                }]);
            }
            return Some(
                paths
                    .into_iter()
                    .map(|path| PathResult {
                        length: path.len() - 1,
                        node_titles: titles(&path),
                        exists: true,
                        path,
                    })
                    .collect(),
            );
        }

        match self.graph.shortest_path(source, target) {
            Some(path) => Some(vec![PathResult {
                length: path.len() - 1,
                node_titles: titles(&path),
                exists: true,
                path,
            }]),
            None => Some(vec![PathResult {
                path: Vec::new(),
                length: 0,
                exists: false,
                node_titles: Vec::new(),
            }]),
        }
    }

    /// Top nodes by a named centrality metric.
    pub fn top_nodes(&mut self, metric: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let metrics = self.centrality_metrics();
        let scores = match metric {
            "degree" => &metrics.degree,
            "betweenness" => &metrics.betweenness,
            "closeness" => &metrics.closeness,
            "eigenvector" => &metrics.eigenvector,
            other => return Err(Error::Validation(format!("Unknown metric: {other}"))),
        };
        let mut sorted: Vec<(i64, f64)> = scores.iter().map(|(&id, &s)| (id, s)).collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        sorted.truncate(limit);
        Ok(sorted)
    }
}

/// Graph view service with the TTL-LRU cache and link mutations.
#[derive(Clone)]
pub struct GraphService {
    store: Arc<dyn MemoryStore>,
    events: EventBus,
    cache: Arc<Mutex<LruCache<u64, (Instant, GraphData)>>>,
}

impl GraphService {
    pub fn new(store: Arc<dyn MemoryStore>, events: EventBus) -> Self {
        GraphService {
            store,
            events,
            cache: Arc::new(Mutex::new(LruCache::new(GRAPH_CACHE_SIZE))),
        }
    }

    fn cache_key(filter: &GraphFilter) -> u64 {
        let mut hasher = DefaultHasher::new();
        filter
            .memory_type
            .map(|t| t.as_str())
            .unwrap_or("all")
            .hash(&mut hasher);
        filter
            .date_range
            .map(|d| format!("{d:?}"))
            .unwrap_or_else(|| "all".to_string())
            .hash(&mut hasher);
        filter.include_isolated.hash(&mut hasher);
        hasher.finish()
    }

    /// Materialize the graph view, serving from cache when fresh.
    pub async fn graph_data(&self, filter: &GraphFilter, use_cache: bool) -> Result<GraphData> {
        let key = Self::cache_key(filter);
        if use_cache {
            let mut cache = self.cache.lock();
            if let Some((cached_at, data)) = cache.get(&key) {
                if cached_at.elapsed() < GRAPH_CACHE_TTL {
                    debug!("Graph cache hit");
                    return Ok(data.clone());
                }
            }
        }

        let data = self.store.graph_data(filter).await?;
        self.cache.lock().put(key, (Instant::now(), data.clone()));
        Ok(data)
    }

    /// Clear the cache. Called on every link mutation.
    pub fn invalidate_cache(&self) {
        self.cache.lock().clear();
    }

    /// Fresh analytics over the filtered view.
    pub async fn analytics(&self, filter: &GraphFilter) -> Result<GraphAnalytics> {
        let data = self.graph_data(filter, true).await?;
        Ok(GraphAnalytics::new(data))
    }

    /// Create a bidirectional link and publish updates for both endpoints.
    pub async fn create_link(
        &self,
        source_id: i64,
        target_id: i64,
        link_type: LinkType,
        relevance_score: Option<f64>,
    ) -> Result<MemoryLink> {
        let link = self
            .store
            .create_link(source_id, target_id, link_type, relevance_score)
            .await?;
        self.invalidate_cache();

        for (a, b) in [(source_id, target_id), (target_id, source_id)] {
            self.events.publish(HubEvent::new(
                EventKind::MemoryUpdated,
                a,
                Some(serde_json::json!({
                    "action": "link_created",
                    "target_id": b,
                    "link_type": link_type.as_str(),
                })),
            ));
        }
        Ok(link)
    }

    /// Delete both directional rows and publish updates.
    pub async fn delete_link(&self, source_id: i64, target_id: i64) -> Result<()> {
        self.store.delete_link(source_id, target_id).await?;
        self.invalidate_cache();

        for (a, b) in [(source_id, target_id), (target_id, source_id)] {
            self.events.publish(HubEvent::new(
                EventKind::MemoryUpdated,
                a,
                Some(serde_json::json!({
                    "action": "link_deleted",
                    "target_id": b,
                })),
            ));
        }
        Ok(())
    }

    /// Transactional batch auto-link creation.
    pub async fn batch_create_links(&self, pairs: &[(i64, i64, f64)]) -> Result<BatchLinkOutcome> {
        let outcome = self.store.batch_create_links(pairs).await?;
        if outcome.created > 0 {
            self.invalidate_cache();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GraphEdge, GraphNode, MemoryType};
    use chrono::Utc;

    fn sample() -> GraphData {
        GraphData {
            nodes: (1..=5)
                .map(|id| GraphNode {
                    id,
                    title: format!("Node {id}"),
                    memory_type: if id % 2 == 0 {
                        MemoryType::Web
                    } else {
                        MemoryType::Note
                    },
                    summary: None,
                    created_at: Utc::now(),
                    connection_count: 0,
                })
                .collect(),
            links: [(1, 2), (2, 3), (3, 1), (4, 5)]
                .iter()
                .map(|&(source, target)| GraphEdge {
                    source,
                    target,
                    link_type: LinkType::Manual,
                    relevance_score: None,
                })
                .collect(),
            total_nodes: 5,
            total_links: 4,
        }
    }

    #[test]
    fn statistics_cover_components_and_distributions() {
        let mut analytics = GraphAnalytics::new(sample());
        let stats = analytics.statistics();
        assert_eq!(stats.num_nodes, 5);
        assert_eq!(stats.num_edges, 4);
        assert_eq!(stats.num_components, 2);
        assert_eq!(stats.diameter, None); // disconnected
        assert_eq!(stats.type_distribution["note"], 3);
        assert_eq!(stats.link_type_distribution["manual"], 4);
    }

    #[test]
    fn path_queries_handle_missing_and_disconnected() {
        let analytics = GraphAnalytics::new(sample());
        assert!(analytics.find_path(1, 99, false).is_none());

        let disconnected = analytics.find_path(1, 4, false).unwrap();
        assert!(!disconnected[0].exists);

        let connected = analytics.find_path(1, 3, false).unwrap();
        assert!(connected[0].exists);
        assert_eq!(connected[0].length, 1);
        assert_eq!(connected[0].node_titles, vec!["Node 1", "Node 3"]);
    }

    #[test]
    fn top_nodes_rejects_unknown_metric() {
        let mut analytics = GraphAnalytics::new(sample());
        assert!(analytics.top_nodes("pagerank", 5).is_err());
        let top = analytics.top_nodes("degree", 2).unwrap();
        assert_eq!(top.len(), 2);
    }
}
