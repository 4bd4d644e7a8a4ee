//! Hybrid vector + keyword search with Reciprocal Rank Fusion.
//!
//! The vector side ranks by cosine distance over the packed f32 embedding
//! column; the keyword side ranks FTS5 matches by BM25. Both rankings are
//! fused with RRF (k = 60). When the FTS index is missing or the query
//! fails, search degrades to pure vector ranking with synthetic RRF scores.

use think_core::types::{serialize_embedding, MatchType, SearchHit};
use think_core::Result;
use tracing::{debug, info, warn};

use super::{storage_err, ts_to_datetime};
use crate::migrations::table_exists;
use crate::LibsqlStore;

/// Vector candidate pool multiplier before fusion.
const VECTOR_POOL_FACTOR: usize = 3;

const HYBRID_SQL: &str = r#"
WITH vector_results AS (
    SELECT id, title, content, url, summary, type, created_at, embedding,
           vector_distance_cos(embedding, ?1) AS distance,
           ROW_NUMBER() OVER (ORDER BY vector_distance_cos(embedding, ?1) ASC) AS vec_rank
    FROM memories
    WHERE embedding IS NOT NULL
    ORDER BY distance ASC
    LIMIT ?4
),
fts_results AS (
    SELECT m.id, m.title, m.content, m.url, m.summary, m.type, m.created_at, m.embedding,
           ROW_NUMBER() OVER (ORDER BY bm25(memories_fts)) AS fts_rank
    FROM memories_fts
    JOIN memories m ON memories_fts.rowid = m.id
    WHERE memories_fts MATCH ?2
    LIMIT ?4
),
combined AS (
    -- Vector-only results
    SELECT v.id, v.title, v.content, v.url, v.summary, v.type, v.created_at,
           v.distance,
           (1.0 / (60.0 + v.vec_rank)) AS rrf_score,
           'vector' AS match_type
    FROM vector_results v
    WHERE v.id NOT IN (SELECT id FROM fts_results)

    UNION ALL

    -- FTS-only results (compute distance when an embedding exists)
    SELECT f.id, f.title, f.content, f.url, f.summary, f.type, f.created_at,
           CASE WHEN f.embedding IS NOT NULL
                THEN vector_distance_cos(f.embedding, ?1)
                ELSE 1.0 END AS distance,
           (1.0 / (60.0 + f.fts_rank)) AS rrf_score,
           'keyword' AS match_type
    FROM fts_results f
    WHERE f.id NOT IN (SELECT id FROM vector_results)

    UNION ALL

    -- Results in both lists (summed RRF score)
    SELECT v.id, v.title, v.content, v.url, v.summary, v.type, v.created_at,
           v.distance,
           (1.0 / (60.0 + v.vec_rank)) + (1.0 / (60.0 + f.fts_rank)) AS rrf_score,
           'hybrid' AS match_type
    FROM vector_results v
    JOIN fts_results f ON v.id = f.id
)
SELECT id, title, content, url, summary, type, created_at, distance, rrf_score, match_type
FROM combined
ORDER BY rrf_score DESC
LIMIT ?3
"#;

const VECTOR_ONLY_SQL: &str = r#"
SELECT id, title, content, url, summary, type, created_at,
       vector_distance_cos(embedding, ?1) AS distance,
       (1.0 / (60.0 + ROW_NUMBER() OVER (ORDER BY vector_distance_cos(embedding, ?1) ASC))) AS rrf_score,
       'vector' AS match_type
FROM memories
WHERE embedding IS NOT NULL
ORDER BY distance ASC
LIMIT ?2
"#;

fn hit_from_row(row: &libsql::Row) -> Result<SearchHit> {
    let match_type = match row.get::<String>(9).map_err(storage_err)?.as_str() {
        "hybrid" => MatchType::Hybrid,
        "keyword" => MatchType::Keyword,
        _ => MatchType::Vector,
    };
    Ok(SearchHit {
        id: row.get(0).map_err(storage_err)?,
        title: row.get::<String>(1).ok(),
        content: row.get::<String>(2).ok(),
        url: row.get::<String>(3).ok(),
        summary: row.get::<String>(4).ok(),
        memory_type: row
            .get::<String>(5)
            .map_err(storage_err)?
            .parse()
            .unwrap_or(think_core::types::MemoryType::Web),
        created_at: ts_to_datetime(row.get(6).map_err(storage_err)?),
        distance: row.get::<f64>(7).ok(),
        rrf_score: row.get(8).map_err(storage_err)?,
        match_type,
    })
}

impl LibsqlStore {
    /// Hybrid search over embeddings and the FTS5 index.
    pub async fn search_similar(
        &self,
        query_embedding: &[f32],
        limit: usize,
        keyword_query: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let conn = self.reader().await?;
        let query_blob = serialize_embedding(query_embedding);

        let keyword_query = keyword_query.filter(|q| !q.trim().is_empty());
        let use_hybrid = match keyword_query {
            Some(_) => table_exists(&conn, "memories_fts").await?,
            None => false,
        };
        debug!("Search starting: use_hybrid={use_hybrid}, keyword_query={keyword_query:?}");

        if use_hybrid {
            let result = conn
                .query(
                    HYBRID_SQL,
                    libsql::params![
                        query_blob.clone(),
                        keyword_query.unwrap_or_default(),
                        limit as i64,
                        (limit * VECTOR_POOL_FACTOR) as i64,
                    ],
                )
                .await;

            match result {
                Ok(mut rows) => {
                    let mut hits = Vec::new();
                    while let Some(row) = rows.next().await.map_err(storage_err)? {
                        hits.push(hit_from_row(&row)?);
                    }
                    info!("Hybrid search returned {} results", hits.len());
                    return Ok(hits);
                }
                Err(e) => {
                    warn!("Hybrid search failed: {e}, falling back to vector-only");
                }
            }
        }

        let mut rows = conn
            .query(
                VECTOR_ONLY_SQL,
                libsql::params![query_blob, limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            hits.push(hit_from_row(&row)?);
        }
        info!("Vector search returned {} results", hits.len());
        Ok(hits)
    }
}
