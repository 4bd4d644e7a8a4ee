//! Centrality measures over the knowledge graph.

use std::collections::{HashMap, VecDeque};

use super::builder::MemoryGraph;

/// Degree centrality: degree normalized by `n - 1`.
pub fn degree_centrality(graph: &MemoryGraph) -> HashMap<i64, f64> {
    let n = graph.node_count();
    let scale = if n > 1 { 1.0 / (n - 1) as f64 } else { 1.0 };
    graph
        .node_ids()
        .into_iter()
        .map(|id| (id, graph.degree(id) as f64 * scale))
        .collect()
}

/// Betweenness centrality via Brandes' accumulation, normalized for
/// undirected graphs.
pub fn betweenness_centrality(graph: &MemoryGraph) -> HashMap<i64, f64> {
    let nodes = graph.node_ids();
    let n = nodes.len();
    let mut centrality: HashMap<i64, f64> = nodes.iter().map(|&id| (id, 0.0)).collect();

    for &source in &nodes {
        // Single-source shortest paths with path counting
        let mut stack = Vec::new();
        let mut predecessors: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut sigma: HashMap<i64, f64> = nodes.iter().map(|&id| (id, 0.0)).collect();
        let mut dist: HashMap<i64, i64> = HashMap::new();
        sigma.insert(source, 1.0);
        dist.insert(source, 0);

        let mut queue = VecDeque::from([source]);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            let dv = dist[&v];
            for w in graph.neighbors(v) {
                if !dist.contains_key(&w) {
                    dist.insert(w, dv + 1);
                    queue.push_back(w);
                }
                if dist[&w] == dv + 1 {
                    *sigma.entry(w).or_insert(0.0) += sigma[&v];
                    predecessors.entry(w).or_default().push(v);
                }
            }
        }

        // Back-propagate dependencies
        let mut delta: HashMap<i64, f64> = nodes.iter().map(|&id| (id, 0.0)).collect();
        while let Some(w) = stack.pop() {
            if let Some(preds) = predecessors.get(&w) {
                for &v in preds {
                    let share = sigma[&v] / sigma[&w] * (1.0 + delta[&w]);
                    *delta.entry(v).or_insert(0.0) += share;
                }
            }
            if w != source {
                *centrality.entry(w).or_insert(0.0) += delta[&w];
            }
        }
    }

    // Undirected: each pair counted twice; normalize by (n-1)(n-2)
    if n > 2 {
        let scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
        for value in centrality.values_mut() {
            *value *= scale;
        }
    } else {
        for value in centrality.values_mut() {
            *value = 0.0;
        }
    }
    centrality
}

/// Closeness centrality with the Wasserman-Faust component scaling, so
/// disconnected graphs still get meaningful per-component values.
pub fn closeness_centrality(graph: &MemoryGraph) -> HashMap<i64, f64> {
    let n = graph.node_count();
    graph
        .node_ids()
        .into_iter()
        .map(|id| {
            let dist = graph.bfs_distances(id);
            let reachable = dist.len();
            let total: usize = dist.values().sum();
            let score = if total > 0 && reachable > 1 && n > 1 {
                let base = (reachable - 1) as f64 / total as f64;
                base * (reachable - 1) as f64 / (n - 1) as f64
            } else {
                0.0
            };
            (id, score)
        })
        .collect()
}

const EIGENVECTOR_MAX_ITER: usize = 100;
const EIGENVECTOR_TOL: f64 = 1e-6;

/// Eigenvector centrality by power iteration. `None` when the iteration
/// fails to converge; callers fall back to degree centrality.
pub fn eigenvector_centrality(graph: &MemoryGraph) -> Option<HashMap<i64, f64>> {
    let nodes = graph.node_ids();
    let n = nodes.len();
    if n == 0 {
        return Some(HashMap::new());
    }

    let mut x: HashMap<i64, f64> = nodes.iter().map(|&id| (id, 1.0 / n as f64)).collect();

    for _ in 0..EIGENVECTOR_MAX_ITER {
        let mut next: HashMap<i64, f64> = nodes.iter().map(|&id| (id, 0.0)).collect();
        for &id in &nodes {
            for neighbor in graph.neighbors(id) {
                *next.entry(neighbor).or_insert(0.0) += x[&id];
            }
        }

        let norm = next.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            // No edges: uniform centrality
            return Some(nodes.iter().map(|&id| (id, 0.0)).collect());
        }
        for value in next.values_mut() {
            *value /= norm;
        }

        let change: f64 = nodes.iter().map(|id| (next[id] - x[id]).abs()).sum();
        x = next;
        if change < EIGENVECTOR_TOL * n as f64 {
            return Some(x);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GraphData, GraphEdge, GraphNode, LinkType, MemoryType};
    use chrono::Utc;

    fn star() -> MemoryGraph {
        // Node 1 is the hub of 2, 3, 4
        graph(&[1, 2, 3, 4], &[(1, 2), (1, 3), (1, 4)])
    }

    fn graph(nodes: &[i64], edges: &[(i64, i64)]) -> MemoryGraph {
        MemoryGraph::build(&GraphData {
            nodes: nodes
                .iter()
                .map(|&id| GraphNode {
                    id,
                    title: format!("n{id}"),
                    memory_type: MemoryType::Web,
                    summary: None,
                    created_at: Utc::now(),
                    connection_count: 0,
                })
                .collect(),
            links: edges
                .iter()
                .map(|&(source, target)| GraphEdge {
                    source,
                    target,
                    link_type: LinkType::Manual,
                    relevance_score: None,
                })
                .collect(),
            total_nodes: nodes.len(),
            total_links: edges.len(),
        })
    }

    #[test]
    fn hub_dominates_degree_centrality() {
        let scores = degree_centrality(&star());
        assert!((scores[&1] - 1.0).abs() < 1e-9);
        assert!((scores[&2] - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn hub_carries_all_betweenness() {
        let scores = betweenness_centrality(&star());
        assert!(scores[&1] > 0.99);
        assert!(scores[&2].abs() < 1e-9);
    }

    #[test]
    fn closeness_favors_the_hub() {
        let scores = closeness_centrality(&star());
        assert!(scores[&1] > scores[&2]);
    }

    #[test]
    fn eigenvector_converges_on_connected_graph() {
        // Star plus one leaf-leaf edge; pure bipartite shapes make the
        // power iteration oscillate and exercise the fallback instead
        let g = graph(&[1, 2, 3, 4], &[(1, 2), (1, 3), (1, 4), (2, 3)]);
        let scores = eigenvector_centrality(&g).unwrap();
        assert!(scores[&1] > scores[&4]);
    }

    #[test]
    fn eigenvector_reports_non_convergence_on_bipartite_star() {
        assert!(eigenvector_centrality(&star()).is_none());
    }

    #[test]
    fn empty_graph_is_handled() {
        let empty = graph(&[], &[]);
        assert!(degree_centrality(&empty).is_empty());
        assert!(betweenness_centrality(&empty).is_empty());
        assert!(eigenvector_centrality(&empty).unwrap().is_empty());
    }
}
