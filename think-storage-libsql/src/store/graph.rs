//! Graph view materialization and insight support queries.

use std::collections::{HashMap, HashSet};
use think_core::types::{
    deserialize_embedding, GraphData, GraphEdge, GraphFilter, GraphNode, LinkTimelineEntry,
    LinkType, MemoryType,
};
use think_core::Result;
use tracing::debug;

use super::{storage_err, ts_to_datetime};
use crate::LibsqlStore;

impl LibsqlStore {
    /// Materialize the filtered graph view.
    ///
    /// Returns filtered nodes with connection counts and the deduped
    /// undirected edges between them (bidirectional row pairs collapse to
    /// one edge).
    pub async fn graph_data(&self, filter: &GraphFilter) -> Result<GraphData> {
        debug!("Materializing graph view: {filter:?}");
        let conn = self.reader().await?;

        let mut sql = String::from(
            "SELECT id, title, type, summary, created_at FROM memories WHERE 1=1",
        );
        let mut params: Vec<libsql::Value> = Vec::new();
        if let Some(memory_type) = filter.memory_type {
            sql.push_str(" AND type = ?");
            params.push(libsql::Value::Text(memory_type.as_str().to_string()));
        }
        if let Some(date_range) = filter.date_range {
            sql.push_str(" AND created_at >= ?");
            params.push(libsql::Value::Integer(
                date_range.cutoff(chrono::Utc::now()).timestamp(),
            ));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(libsql::Value::Integer(limit as i64));
        }

        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(storage_err)?;

        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            nodes.push(GraphNode {
                id: row.get(0).map_err(storage_err)?,
                title: row
                    .get::<String>(1)
                    .ok()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string()),
                memory_type: row
                    .get::<String>(2)
                    .map_err(storage_err)?
                    .parse()
                    .unwrap_or(MemoryType::Web),
                summary: row.get::<String>(3).ok(),
                created_at: ts_to_datetime(row.get(4).map_err(storage_err)?),
                connection_count: 0,
            });
        }

        let mut node_ids: HashSet<i64> = nodes.iter().map(|n| n.id).collect();

        // Connection counts over the bidirectional storage: counting
        // outgoing rows covers both directions
        let mut counts: HashMap<i64, i64> = HashMap::new();
        if !node_ids.is_empty() {
            let id_list = node_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let count_sql = format!(
                "SELECT source_memory_id, COUNT(*) FROM memory_links \
                 WHERE source_memory_id IN ({id_list}) GROUP BY source_memory_id"
            );
            let mut rows = conn.query(&count_sql, ()).await.map_err(storage_err)?;
            while let Some(row) = rows.next().await.map_err(storage_err)? {
                counts.insert(
                    row.get(0).map_err(storage_err)?,
                    row.get(1).map_err(storage_err)?,
                );
            }
        }
        for node in &mut nodes {
            node.connection_count = counts.get(&node.id).copied().unwrap_or(0);
        }

        if !filter.include_isolated {
            nodes.retain(|n| n.connection_count > 0);
            node_ids = nodes.iter().map(|n| n.id).collect();
        }

        // Interconnecting links, deduping the bidirectional pairs
        let mut links = Vec::new();
        if !node_ids.is_empty() {
            let id_list = node_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let link_sql = format!(
                "SELECT source_memory_id, target_memory_id, link_type, relevance_score \
                 FROM memory_links \
                 WHERE source_memory_id IN ({id_list}) AND target_memory_id IN ({id_list})"
            );
            let mut rows = conn.query(&link_sql, ()).await.map_err(storage_err)?;
            let mut seen: HashSet<(i64, i64)> = HashSet::new();
            while let Some(row) = rows.next().await.map_err(storage_err)? {
                let source: i64 = row.get(0).map_err(storage_err)?;
                let target: i64 = row.get(1).map_err(storage_err)?;
                let pair = (source.min(target), source.max(target));
                if !seen.insert(pair) {
                    continue;
                }
                links.push(GraphEdge {
                    source,
                    target,
                    link_type: row
                        .get::<String>(2)
                        .map_err(storage_err)?
                        .parse()
                        .unwrap_or(LinkType::Manual),
                    relevance_score: row.get::<f64>(3).ok(),
                });
            }
        }

        Ok(GraphData {
            total_nodes: nodes.len(),
            total_links: links.len(),
            nodes,
            links,
        })
    }

    /// Bulk-fetch embeddings for the given nodes.
    pub async fn embeddings_for_nodes(
        &self,
        node_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<f32>>> {
        if node_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.reader().await?;
        let id_list = node_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, embedding FROM memories \
             WHERE id IN ({id_list}) AND embedding IS NOT NULL"
        );
        let mut rows = conn.query(&sql, ()).await.map_err(storage_err)?;

        let mut embeddings = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let id: i64 = row.get(0).map_err(storage_err)?;
            let bytes: Vec<u8> = row.get(1).map_err(storage_err)?;
            embeddings.insert(id, deserialize_embedding(&bytes));
        }
        Ok(embeddings)
    }

    /// Daily link-creation counts for the last `days`, most recent first.
    /// Bidirectional pairs count once.
    pub async fn link_creation_timeline(&self, days: u32) -> Result<Vec<LinkTimelineEntry>> {
        let conn = self.reader().await?;
        let cutoff = chrono::Utc::now().timestamp() - i64::from(days) * 86_400;
        let mut rows = conn
            .query(
                r#"
                SELECT date(created_at, 'unixepoch') AS day, COUNT(*) / 2 AS count
                FROM memory_links
                WHERE created_at >= ?
                GROUP BY day
                ORDER BY day DESC
                "#,
                libsql::params![cutoff],
            )
            .await
            .map_err(storage_err)?;

        let mut timeline = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            timeline.push(LinkTimelineEntry {
                date: row.get(0).map_err(storage_err)?,
                count: row.get(1).map_err(storage_err)?,
            });
        }
        Ok(timeline)
    }
}
