//! Memory CRUD and reprocessing queries.

use libsql::Value;
use think_core::types::{
    serialize_embedding, Memory, MemoryQuery, MemorySummary, NewMemory, ProcessingCounts,
    ReembedCandidate, TagInfo,
};
use think_core::{Error, Result};
use tracing::{debug, info};

use super::{now_ts, row_to_memory, storage_err};
use crate::schema::MEMORY_COLUMNS;
use crate::LibsqlStore;

/// Retry governor threshold; memories past it drop out of the summary queue.
const MAX_PROCESSING_ATTEMPTS: i64 = 3;

fn qualified_columns(alias: &str) -> String {
    MEMORY_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn candidate_from_row(row: &libsql::Row) -> Result<ReembedCandidate> {
    Ok(ReembedCandidate {
        id: row.get(0).map_err(storage_err)?,
        title: row.get::<String>(1).ok(),
        content: row.get::<String>(2).ok(),
        embedding_summary: row.get::<String>(3).ok(),
    })
}

fn memory_to_summary(memory: Memory) -> MemorySummary {
    let audio = memory.kind.audio().cloned();
    let video = memory.kind.video().cloned();
    let document = memory.kind.document().cloned();
    MemorySummary {
        id: memory.id,
        memory_type: memory.memory_type(),
        url: memory.url,
        title: memory.title,
        summary: memory.summary,
        tags: memory.tags,
        created_at: memory.created_at,
        audio_duration: audio.as_ref().and_then(|a| a.audio_duration),
        transcription_status: audio.as_ref().and_then(|a| a.transcription_status),
        media_source: audio.as_ref().and_then(|a| a.media_source),
        video_duration: video.as_ref().and_then(|v| v.video_duration),
        video_width: video.as_ref().and_then(|v| v.video_width),
        video_height: video.as_ref().and_then(|v| v.video_height),
        video_processing_status: video.as_ref().and_then(|v| v.video_processing_status),
        thumbnail_path: video
            .as_ref()
            .and_then(|v| v.thumbnail_path.clone())
            .or_else(|| document.as_ref().and_then(|d| d.thumbnail_path.clone())),
        document_format: document.as_ref().and_then(|d| d.document_format.clone()),
        document_page_count: document.as_ref().and_then(|d| d.document_page_count),
    }
}

impl LibsqlStore {
    /// Insert a memory and return it with the assigned id.
    pub async fn create_memory(&self, new: NewMemory) -> Result<Memory> {
        let conn = self.writer().await;

        let sql = r#"
            INSERT INTO memories (
                type, url, title, original_title, content, summary,
                embedding, embedding_model, processing_attempts, created_at,
                audio_path, audio_format, audio_duration, transcription_status, media_source,
                video_path, video_format, video_duration, video_width, video_height,
                video_processing_status, document_path, document_format, document_page_count,
                thumbnail_path
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let embedding_bytes = new.embedding.as_deref().map(serialize_embedding);
        // The model identifier only makes sense next to a vector
        let embedding_model = if embedding_bytes.is_some() {
            new.embedding_model.clone()
        } else {
            None
        };

        conn.execute(
            sql,
            libsql::params![
                new.resolved_type().as_str(),
                new.url.clone(),
                new.title.clone(),
                new.original_title.clone(),
                new.content.clone(),
                new.summary.clone(),
                embedding_bytes,
                embedding_model,
                now_ts(),
                new.audio_path.clone(),
                new.audio_format.clone(),
                new.audio_duration,
                new.transcription_status.map(|s| s.as_str()),
                new.media_source.map(|s| s.as_str()),
                new.video_path.clone(),
                new.video_format.clone(),
                new.video_duration,
                new.video_width,
                new.video_height,
                new.video_processing_status.map(|s| s.as_str()),
                new.document_path.clone(),
                new.document_format.clone(),
                new.document_page_count,
                new.thumbnail_path.clone(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("Failed to create memory: {e}")))?;

        let id = conn.last_insert_rowid();
        drop(conn);

        info!("Created memory {id}");
        self.get_memory(id)
            .await?
            .ok_or_else(|| Error::Storage(format!("Memory {id} vanished after insert")))
    }

    /// Fetch a memory with its tags.
    pub async fn get_memory(&self, id: i64) -> Result<Option<Memory>> {
        let conn = self.reader().await?;
        let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?");
        let mut rows = conn
            .query(&sql, libsql::params![id])
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let mut memory = row_to_memory(&row)?;
        memory.tags = self.memory_tags(id).await?;
        Ok(Some(memory))
    }

    /// Most recent memory with the given URL.
    pub async fn get_memory_by_url(&self, url: &str) -> Result<Option<Memory>> {
        let conn = self.reader().await?;
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE url = ? ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let mut rows = conn
            .query(&sql, libsql::params![url])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let mut memory = row_to_memory(&row)?;
                memory.tags = self.memory_tags(memory.id).await?;
                Ok(Some(memory))
            }
            None => Ok(None),
        }
    }

    /// Paginated listing with filters; tags are fetched in one batched
    /// query keyed by `memory_id IN (...)`.
    pub async fn list_memories(&self, query: MemoryQuery) -> Result<(Vec<MemorySummary>, u64)> {
        debug!("Listing memories with filters: {query:?}");
        let conn = self.reader().await?;

        let mut where_sql = String::from(" WHERE 1=1");
        let mut params: Vec<Value> = Vec::new();
        let mut join_sql = String::new();

        if let Some(type_filter) = query.type_filter {
            where_sql.push_str(" AND m.type = ?");
            params.push(Value::Text(type_filter.as_str().to_string()));
        }
        if let Some(date_filter) = query.date_filter {
            where_sql.push_str(" AND m.created_at >= ?");
            params.push(Value::Integer(
                date_filter.cutoff(chrono::Utc::now()).timestamp(),
            ));
        }
        if let Some(tag) = &query.tag_filter {
            join_sql.push_str(
                " JOIN memory_tags mt ON m.id = mt.memory_id JOIN tags t ON mt.tag_id = t.id",
            );
            where_sql.push_str(" AND t.name = ?");
            params.push(Value::Text(tag.trim().to_lowercase()));
        }

        let count_sql = format!("SELECT COUNT(DISTINCT m.id) FROM memories m{join_sql}{where_sql}");
        let mut rows = conn
            .query(&count_sql, libsql::params_from_iter(params.clone()))
            .await
            .map_err(storage_err)?;
        let total: i64 = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get(0).map_err(storage_err)?,
            None => 0,
        };

        let list_sql = format!(
            "SELECT DISTINCT {} FROM memories m{join_sql}{where_sql} \
             ORDER BY m.created_at DESC, m.id DESC LIMIT ? OFFSET ?",
            qualified_columns("m")
        );
        params.push(Value::Integer(query.limit as i64));
        params.push(Value::Integer(query.offset as i64));

        let mut rows = conn
            .query(&list_sql, libsql::params_from_iter(params))
            .await
            .map_err(storage_err)?;

        let mut memories = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            memories.push(row_to_memory(&row)?);
        }
        if memories.is_empty() {
            return Ok((Vec::new(), total as u64));
        }

        // Batched tag fetch for the whole page
        let ids: Vec<i64> = memories.iter().map(|m| m.id).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let tags_sql = format!(
            "SELECT mt.memory_id, t.id, t.name, mt.source \
             FROM memory_tags mt JOIN tags t ON mt.tag_id = t.id \
             WHERE mt.memory_id IN ({placeholders})"
        );
        let tag_params: Vec<Value> = ids.iter().map(|&id| Value::Integer(id)).collect();
        let mut rows = conn
            .query(&tags_sql, libsql::params_from_iter(tag_params))
            .await
            .map_err(storage_err)?;

        let mut tags_by_memory: std::collections::HashMap<i64, Vec<TagInfo>> =
            std::collections::HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let memory_id: i64 = row.get(0).map_err(storage_err)?;
            let tag = TagInfo {
                id: row.get(1).map_err(storage_err)?,
                name: row.get(2).map_err(storage_err)?,
                source: row.get::<String>(3).ok().and_then(|s| s.parse().ok()),
            };
            tags_by_memory.entry(memory_id).or_default().push(tag);
        }

        let summaries = memories
            .into_iter()
            .map(|mut memory| {
                memory.tags = tags_by_memory.remove(&memory.id).unwrap_or_default();
                memory_to_summary(memory)
            })
            .collect();
        Ok((summaries, total as u64))
    }

    /// Update title/content, optionally replacing the embedding.
    pub async fn update_memory(
        &self,
        id: i64,
        title: &str,
        content: &str,
        embedding: Option<(&[f32], &str)>,
    ) -> Result<Option<Memory>> {
        {
            let conn = self.writer().await;
            let changed = match embedding {
                Some((vector, model)) => conn
                    .execute(
                        "UPDATE memories SET title = ?, content = ?, embedding = ?, embedding_model = ? WHERE id = ?",
                        libsql::params![title, content, serialize_embedding(vector), model, id],
                    )
                    .await
                    .map_err(storage_err)?,
                None => conn
                    .execute(
                        "UPDATE memories SET title = ?, content = ? WHERE id = ?",
                        libsql::params![title, content, id],
                    )
                    .await
                    .map_err(storage_err)?,
            };
            if changed == 0 {
                return Ok(None);
            }
        }
        self.get_memory(id).await
    }

    /// Delete a memory row; joins cascade.
    pub async fn delete_memory(&self, id: i64) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute("DELETE FROM memories WHERE id = ?", libsql::params![id])
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete memory: {e}")))?;
        if changed > 0 {
            info!("Deleted memory {id}");
        }
        Ok(changed > 0)
    }

    async fn update_single_field(&self, sql: &str, value: &str, id: i64) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(sql, libsql::params![value, id])
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn update_memory_embedding(
        &self,
        id: i64,
        embedding: &[f32],
        model: &str,
    ) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE memories SET embedding = ?, embedding_model = ? WHERE id = ?",
                libsql::params![serialize_embedding(embedding), model, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn update_memory_summary(&self, id: i64, summary: &str) -> Result<bool> {
        self.update_single_field("UPDATE memories SET summary = ? WHERE id = ?", summary, id)
            .await
    }

    pub async fn update_memory_embedding_summary(
        &self,
        id: i64,
        embedding_summary: &str,
    ) -> Result<bool> {
        self.update_single_field(
            "UPDATE memories SET embedding_summary = ? WHERE id = ?",
            embedding_summary,
            id,
        )
        .await
    }

    pub async fn update_memory_title(&self, id: i64, title: &str) -> Result<bool> {
        self.update_single_field("UPDATE memories SET title = ? WHERE id = ?", title, id)
            .await
    }

    pub async fn increment_processing_attempts(&self, id: i64) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE memories SET processing_attempts = COALESCE(processing_attempts, 0) + 1 WHERE id = ?",
                libsql::params![id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Counts a reembed job started now would process.
    pub async fn count_memories_needing_processing(
        &self,
        current_model: &str,
    ) -> Result<ProcessingCounts> {
        let conn = self.reader().await?;

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM memories WHERE embedding_summary IS NULL",
                (),
            )
            .await
            .map_err(storage_err)?;
        let need_summary: i64 = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get(0).map_err(storage_err)?,
            None => 0,
        };

        let mut rows = conn
            .query(
                r#"
                SELECT COUNT(*) FROM memories
                WHERE embedding_summary IS NOT NULL
                  AND (embedding IS NULL OR embedding_model IS NULL OR embedding_model != ?)
                "#,
                libsql::params![current_model],
            )
            .await
            .map_err(storage_err)?;
        let need_embedding: i64 = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get(0).map_err(storage_err)?,
            None => 0,
        };

        Ok(ProcessingCounts {
            need_summary: need_summary as u64,
            need_embedding: need_embedding as u64,
            total: (need_summary + need_embedding) as u64,
        })
    }

    /// Memories lacking an embedding summary, excluding those that already
    /// failed too many times.
    pub async fn memories_without_embedding_summary(
        &self,
        limit: usize,
    ) -> Result<Vec<ReembedCandidate>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, title, content, embedding_summary FROM memories
                WHERE embedding_summary IS NULL
                  AND (processing_attempts IS NULL OR processing_attempts < ?)
                ORDER BY id LIMIT ?
                "#,
                libsql::params![MAX_PROCESSING_ATTEMPTS, limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            out.push(candidate_from_row(&row)?);
        }
        Ok(out)
    }

    /// Memories whose vector is missing or was produced by another model.
    pub async fn memories_needing_reembedding(
        &self,
        current_model: &str,
        limit: usize,
    ) -> Result<Vec<ReembedCandidate>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, title, content, embedding_summary FROM memories
                WHERE embedding_summary IS NOT NULL
                  AND (embedding IS NULL OR embedding_model IS NULL OR embedding_model != ?)
                ORDER BY id LIMIT ?
                "#,
                libsql::params![current_model, limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            out.push(candidate_from_row(&row)?);
        }
        Ok(out)
    }

    pub async fn memories_without_embeddings(&self) -> Result<Vec<ReembedCandidate>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, content, embedding_summary FROM memories WHERE embedding IS NULL ORDER BY id",
                (),
            )
            .await
            .map_err(storage_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            out.push(candidate_from_row(&row)?);
        }
        Ok(out)
    }

    pub async fn count_memories_with_embeddings(&self) -> Result<u64> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM memories WHERE embedding IS NOT NULL", ())
            .await
            .map_err(storage_err)?;
        let count: i64 = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get(0).map_err(storage_err)?,
            None => 0,
        };
        Ok(count as u64)
    }
}
