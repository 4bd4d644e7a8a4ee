//! Community detection by greedy modularity maximization.
//!
//! Agglomerative merging: every node starts in its own community and the
//! pair whose merge yields the largest modularity gain is merged until no
//! merge improves modularity.

use std::collections::{HashMap, HashSet};

use super::builder::MemoryGraph;

/// Modularity of a partition (standard Newman definition, unweighted).
pub fn modularity(graph: &MemoryGraph, communities: &[Vec<i64>]) -> f64 {
    let m = graph.edge_count() as f64;
    if m == 0.0 {
        return 0.0;
    }

    let mut community_of: HashMap<i64, usize> = HashMap::new();
    for (idx, community) in communities.iter().enumerate() {
        for &node in community {
            community_of.insert(node, idx);
        }
    }

    let mut score = 0.0;
    for &a in &graph.node_ids() {
        for b in graph.neighbors(a) {
            if community_of.get(&a) == community_of.get(&b) {
                score += 1.0; // Each undirected edge visited twice
            }
        }
    }
    score /= 2.0 * m;

    let mut degree_sums: HashMap<usize, f64> = HashMap::new();
    for &node in &graph.node_ids() {
        if let Some(&c) = community_of.get(&node) {
            *degree_sums.entry(c).or_insert(0.0) += graph.degree(node) as f64;
        }
    }
    for sum in degree_sums.values() {
        score -= (sum / (2.0 * m)).powi(2);
    }
    score
}

/// Greedy modularity communities, largest first.
pub fn greedy_modularity_communities(graph: &MemoryGraph) -> Vec<Vec<i64>> {
    let nodes = graph.node_ids();
    if nodes.is_empty() {
        return Vec::new();
    }
    let m = graph.edge_count() as f64;
    if m == 0.0 {
        // No edges: every node is its own community
        return nodes.into_iter().map(|id| vec![id]).collect();
    }

    let mut communities: Vec<HashSet<i64>> =
        nodes.iter().map(|&id| HashSet::from([id])).collect();

    loop {
        let mut best_gain = 0.0;
        let mut best_pair: Option<(usize, usize)> = None;

        // Only communities connected by at least one edge can gain
        for i in 0..communities.len() {
            for j in (i + 1)..communities.len() {
                if !connected(graph, &communities[i], &communities[j]) {
                    continue;
                }
                let gain = merge_gain(graph, m, &communities[i], &communities[j]);
                if gain > best_gain {
                    best_gain = gain;
                    best_pair = Some((i, j));
                }
            }
        }

        let Some((i, j)) = best_pair else { break };
        let merged: HashSet<i64> = communities[i].union(&communities[j]).copied().collect();
        communities.remove(j);
        communities[i] = merged;
    }

    let mut result: Vec<Vec<i64>> = communities
        .into_iter()
        .map(|set| {
            let mut v: Vec<i64> = set.into_iter().collect();
            v.sort_unstable();
            v
        })
        .collect();
    result.sort_by_key(|c| std::cmp::Reverse(c.len()));
    result
}

fn connected(graph: &MemoryGraph, a: &HashSet<i64>, b: &HashSet<i64>) -> bool {
    a.iter()
        .any(|&node| graph.neighbors(node).iter().any(|n| b.contains(n)))
}

/// Modularity gain of merging two communities:
/// `e_ij / m - 2 * (d_i / 2m) * (d_j / 2m)` with `e_ij` the edges between
/// them and `d_*` the community degree sums.
fn merge_gain(graph: &MemoryGraph, m: f64, a: &HashSet<i64>, b: &HashSet<i64>) -> f64 {
    let mut between = 0.0;
    for &node in a {
        for neighbor in graph.neighbors(node) {
            if b.contains(&neighbor) {
                between += 1.0;
            }
        }
    }
    let degree_a: f64 = a.iter().map(|&n| graph.degree(n) as f64).sum();
    let degree_b: f64 = b.iter().map(|&n| graph.degree(n) as f64).sum();

    between / m - 2.0 * (degree_a / (2.0 * m)) * (degree_b / (2.0 * m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GraphData, GraphEdge, GraphNode, LinkType, MemoryType};
    use chrono::Utc;

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
    fn two_cliques_with_a_bridge_split_in_two() {
        // Cliques {1,2,3} and {4,5,6} bridged by 3-4
        let g = graph(
            &[1, 2, 3, 4, 5, 6],
            &[(1, 2), (2, 3), (1, 3), (4, 5), (5, 6), (4, 6), (3, 4)],
        );
        let communities = greedy_modularity_communities(&g);
        assert_eq!(communities.len(), 2);
        let first: HashSet<i64> = communities[0].iter().copied().collect();
        assert!(first == HashSet::from([1, 2, 3]) || first == HashSet::from([4, 5, 6]));

        let q = modularity(&g, &communities);
        assert!(q > 0.2, "expected positive modularity, got {q}");
    }

    #[test]
    fn edgeless_graph_keeps_singletons() {
        let g = graph(&[1, 2, 3], &[]);
        assert_eq!(greedy_modularity_communities(&g).len(), 3);
        assert_eq!(modularity(&g, &[vec![1], vec![2], vec![3]]), 0.0);
    }
}
