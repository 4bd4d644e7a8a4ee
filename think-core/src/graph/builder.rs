//! Undirected graph built from the materialized node/link view.

use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashMap, VecDeque};

use crate::types::{GraphData, LinkType, MemoryType};

#[derive(Debug, Clone)]
pub struct NodeMeta {
    pub title: String,
    pub memory_type: MemoryType,
}

/// Undirected knowledge graph over memory ids.
pub struct MemoryGraph {
    graph: UnGraph<i64, LinkType>,
    index: HashMap<i64, NodeIndex>,
    meta: HashMap<i64, NodeMeta>,
}

impl MemoryGraph {
    /// Build from graph data; edges referencing missing nodes are skipped.
    pub fn build(data: &GraphData) -> Self {
        let mut graph = UnGraph::default();
        let mut index = HashMap::new();
        let mut meta = HashMap::new();

        for node in &data.nodes {
            let idx = graph.add_node(node.id);
            index.insert(node.id, idx);
            meta.insert(
                node.id,
                NodeMeta {
                    title: node.title.clone(),
                    memory_type: node.memory_type,
                },
            );
        }

        for link in &data.links {
            if let (Some(&a), Some(&b)) = (index.get(&link.source), index.get(&link.target)) {
                if a != b && graph.find_edge(a, b).is_none() {
                    graph.add_edge(a, b, link.link_type);
                }
            }
        }

        MemoryGraph { graph, index, meta }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node_ids(&self) -> Vec<i64> {
        self.graph.node_weights().copied().collect()
    }

    pub fn title(&self, id: i64) -> String {
        self.meta
            .get(&id)
            .map(|m| m.title.clone())
            .unwrap_or_else(|| format!("Node {id}"))
    }

    pub fn memory_type(&self, id: i64) -> Option<MemoryType> {
        self.meta.get(&id).map(|m| m.memory_type)
    }

    pub fn degree(&self, id: i64) -> usize {
        self.index
            .get(&id)
            .map(|&idx| self.graph.neighbors(idx).count())
            .unwrap_or(0)
    }

    pub fn neighbors(&self, id: i64) -> Vec<i64> {
        self.index
            .get(&id)
            .map(|&idx| {
                self.graph
                    .neighbors(idx)
                    .map(|n| self.graph[n])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_edge(&self, a: i64, b: i64) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// BFS distances from `start` over unweighted edges.
    pub fn bfs_distances(&self, start: i64) -> HashMap<i64, usize> {
        let mut dist = HashMap::new();
        if !self.contains(start) {
            return dist;
        }
        dist.insert(start, 0);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            let d = dist[&current];
            for neighbor in self.neighbors(current) {
                if !dist.contains_key(&neighbor) {
                    dist.insert(neighbor, d + 1);
                    queue.push_back(neighbor);
                }
            }
        }
        dist
    }

    /// Hop distance between two nodes, if connected.
    pub fn path_length(&self, a: i64, b: i64) -> Option<usize> {
        self.bfs_distances(a).get(&b).copied()
    }

    /// One shortest path between two nodes.
    pub fn shortest_path(&self, source: i64, target: i64) -> Option<Vec<i64>> {
        if !self.contains(source) || !self.contains(target) {
            return None;
        }
        if source == target {
            return Some(vec![source]);
        }

        let mut parent: HashMap<i64, i64> = HashMap::new();
        let mut queue = VecDeque::from([source]);
        parent.insert(source, source);

        while let Some(current) = queue.pop_front() {
            for neighbor in self.neighbors(current) {
                if parent.contains_key(&neighbor) {
                    continue;
                }
                parent.insert(neighbor, current);
                if neighbor == target {
                    let mut path = vec![target];
                    let mut cursor = target;
                    while cursor != source {
                        cursor = parent[&cursor];
                        path.push(cursor);
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(neighbor);
            }
        }
        None
    }

    /// All shortest paths between two nodes.
    pub fn all_shortest_paths(&self, source: i64, target: i64) -> Vec<Vec<i64>> {
        let Some(target_dist) = self.path_length(source, target) else {
            return Vec::new();
        };
        let dist = self.bfs_distances(source);

        // Walk backwards from the target along strictly decreasing distances
        let mut paths = Vec::new();
        let mut stack = vec![vec![target]];
        while let Some(partial) = stack.pop() {
            let head = partial[partial.len() - 1];
            if head == source {
                let mut path = partial.clone();
                path.reverse();
                paths.push(path);
                continue;
            }
            let head_dist = dist[&head];
            for neighbor in self.neighbors(head) {
                if dist.get(&neighbor) == Some(&(head_dist - 1)) {
                    let mut next = partial.clone();
                    next.push(neighbor);
                    stack.push(next);
                }
            }
        }
        debug_assert!(paths.iter().all(|p| p.len() == target_dist + 1));
        paths
    }

    /// Connected components as lists of memory ids.
    pub fn connected_components(&self) -> Vec<Vec<i64>> {
        let mut seen: HashMap<i64, bool> = HashMap::new();
        let mut components = Vec::new();
        for id in self.node_ids() {
            if seen.contains_key(&id) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([id]);
            seen.insert(id, true);
            while let Some(current) = queue.pop_front() {
                component.push(current);
                for neighbor in self.neighbors(current) {
                    if seen.insert(neighbor, true).is_none() {
                        queue.push_back(neighbor);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Local clustering coefficient averaged over all nodes.
    pub fn average_clustering(&self) -> f64 {
        let n = self.node_count();
        if n == 0 {
            return 0.0;
        }
        let total: f64 = self
            .node_ids()
            .into_iter()
            .map(|id| {
                let neighbors = self.neighbors(id);
                let k = neighbors.len();
                if k < 2 {
                    return 0.0;
                }
                let mut triangles = 0_usize;
                for i in 0..k {
                    for j in (i + 1)..k {
                        if self.has_edge(neighbors[i], neighbors[j]) {
                            triangles += 1;
                        }
                    }
                }
                (2 * triangles) as f64 / (k * (k - 1)) as f64
            })
            .sum();
        total / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GraphEdge, GraphNode};
    use chrono::Utc;

    pub(crate) fn data(nodes: &[i64], edges: &[(i64, i64)]) -> GraphData {
        GraphData {
            nodes: nodes
                .iter()
                .map(|&id| GraphNode {
                    id,
                    title: format!("Node {id}"),
                    memory_type: MemoryType::Note,
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
        }
    }

    #[test]
    fn builds_undirected_without_duplicate_edges() {
        let graph = MemoryGraph::build(&data(&[1, 2, 3], &[(1, 2), (2, 1), (2, 3)]));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge(2, 1));
    }

    #[test]
    fn shortest_path_on_a_line() {
        let graph = MemoryGraph::build(&data(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 4)]));
        assert_eq!(graph.shortest_path(1, 4), Some(vec![1, 2, 3, 4]));
        assert_eq!(graph.path_length(1, 4), Some(3));
    }

    #[test]
    fn all_shortest_paths_on_a_diamond() {
        let graph = MemoryGraph::build(&data(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]));
        let paths = graph.all_shortest_paths(1, 4);
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn disconnected_nodes_have_no_path() {
        let graph = MemoryGraph::build(&data(&[1, 2, 3], &[(1, 2)]));
        assert_eq!(graph.shortest_path(1, 3), None);
        assert_eq!(graph.connected_components().len(), 2);
    }

    #[test]
    fn triangle_has_full_clustering() {
        let graph = MemoryGraph::build(&data(&[1, 2, 3], &[(1, 2), (2, 3), (1, 3)]));
        assert!((graph.average_clustering() - 1.0).abs() < 1e-9);
    }
}
