//! Tag CRUD and the memory/tag join.

use think_core::types::{TagInfo, TagSource, TagUsage};
use think_core::{Error, Result};
use tracing::debug;

use super::storage_err;
use crate::LibsqlStore;

impl LibsqlStore {
    /// All tags with usage counts, most used first.
    pub async fn all_tags(&self) -> Result<Vec<TagUsage>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT t.id, t.name, COUNT(mt.memory_id) AS usage_count
                FROM tags t
                LEFT JOIN memory_tags mt ON t.id = mt.tag_id
                GROUP BY t.id
                ORDER BY usage_count DESC, t.name
                "#,
                (),
            )
            .await
            .map_err(storage_err)?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            tags.push(TagUsage {
                id: row.get(0).map_err(storage_err)?,
                name: row.get(1).map_err(storage_err)?,
                usage_count: row.get(2).map_err(storage_err)?,
            });
        }
        Ok(tags)
    }

    /// Get or create a tag; names are trimmed and lowercased.
    pub async fn get_or_create_tag(&self, name: &str) -> Result<TagInfo> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::Validation("Tag name cannot be empty".to_string()));
        }

        let conn = self.writer().await;
        conn.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?)",
            libsql::params![normalized.clone()],
        )
        .await
        .map_err(storage_err)?;

        let mut rows = conn
            .query(
                "SELECT id, name FROM tags WHERE name = ?",
                libsql::params![normalized],
            )
            .await
            .map_err(storage_err)?;
        let row = rows
            .next()
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::Storage("Tag vanished after insert".to_string()))?;
        Ok(TagInfo {
            id: row.get(0).map_err(storage_err)?,
            name: row.get(1).map_err(storage_err)?,
            source: None,
        })
    }

    /// Attach tags to a memory. Missing tags are created; join rows are
    /// deduped so re-adding an overlapping set never duplicates.
    pub async fn add_tags_to_memory(
        &self,
        memory_id: i64,
        names: &[String],
        source: TagSource,
    ) -> Result<Vec<TagInfo>> {
        let conn = self.writer().await;

        let mut exists = conn
            .query(
                "SELECT id FROM memories WHERE id = ?",
                libsql::params![memory_id],
            )
            .await
            .map_err(storage_err)?;
        if exists.next().await.map_err(storage_err)?.is_none() {
            return Ok(Vec::new());
        }

        let mut added = Vec::new();
        for name in names {
            let normalized = name.trim().to_lowercase();
            if normalized.is_empty() {
                continue;
            }

            conn.execute(
                "INSERT OR IGNORE INTO tags (name) VALUES (?)",
                libsql::params![normalized.clone()],
            )
            .await
            .map_err(storage_err)?;

            let mut rows = conn
                .query(
                    "SELECT id FROM tags WHERE name = ?",
                    libsql::params![normalized.clone()],
                )
                .await
                .map_err(storage_err)?;
            let Some(row) = rows.next().await.map_err(storage_err)? else {
                continue;
            };
            let tag_id: i64 = row.get(0).map_err(storage_err)?;

            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO memory_tags (memory_id, tag_id, source) VALUES (?, ?, ?)",
                    libsql::params![memory_id, tag_id, source.as_str()],
                )
                .await
                .map_err(storage_err)?;
            if inserted > 0 {
                added.push(TagInfo {
                    id: tag_id,
                    name: normalized,
                    source: Some(source),
                });
            }
        }

        debug!("Added {} tags to memory {memory_id}", added.len());
        Ok(added)
    }

    pub async fn remove_tag_from_memory(&self, memory_id: i64, tag_id: i64) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "DELETE FROM memory_tags WHERE memory_id = ? AND tag_id = ?",
                libsql::params![memory_id, tag_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Tags for one memory with their attachment source.
    pub async fn memory_tags(&self, memory_id: i64) -> Result<Vec<TagInfo>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT t.id, t.name, mt.source
                FROM memory_tags mt JOIN tags t ON mt.tag_id = t.id
                WHERE mt.memory_id = ?
                "#,
                libsql::params![memory_id],
            )
            .await
            .map_err(storage_err)?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            tags.push(TagInfo {
                id: row.get(0).map_err(storage_err)?,
                name: row.get(1).map_err(storage_err)?,
                source: row.get::<String>(2).ok().and_then(|s| s.parse().ok()),
            });
        }
        Ok(tags)
    }
}
