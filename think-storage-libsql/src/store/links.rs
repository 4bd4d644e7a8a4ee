//! Bidirectional memory links.
//!
//! A logical link A↔B is stored as two directed rows with the same type and
//! score, created and deleted as a unit. The symmetry keeps every link query
//! a single indexed scan over `source_memory_id`.

use think_core::types::{BatchLinkOutcome, LinkType, LinkedMemory, MemoryLink};
use think_core::{Error, Result};
use tracing::{info, warn};

use super::{now_ts, storage_err, ts_to_datetime};
use crate::LibsqlStore;

async fn memory_exists(conn: &libsql::Connection, id: i64) -> Result<bool> {
    let mut rows = conn
        .query("SELECT id FROM memories WHERE id = ?", libsql::params![id])
        .await
        .map_err(storage_err)?;
    Ok(rows.next().await.map_err(storage_err)?.is_some())
}

async fn link_exists_either_direction(
    conn: &libsql::Connection,
    a: i64,
    b: i64,
) -> Result<bool> {
    let mut rows = conn
        .query(
            r#"
            SELECT id FROM memory_links
            WHERE (source_memory_id = ?1 AND target_memory_id = ?2)
               OR (source_memory_id = ?2 AND target_memory_id = ?1)
            LIMIT 1
            "#,
            libsql::params![a, b],
        )
        .await
        .map_err(storage_err)?;
    Ok(rows.next().await.map_err(storage_err)?.is_some())
}

impl LibsqlStore {
    /// Create a bidirectional link in one transaction.
    pub async fn create_link(
        &self,
        source_id: i64,
        target_id: i64,
        link_type: LinkType,
        relevance_score: Option<f64>,
    ) -> Result<MemoryLink> {
        if source_id == target_id {
            return Err(Error::Validation(
                "Cannot link memory to itself".to_string(),
            ));
        }
        if let Some(score) = relevance_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(Error::Validation(
                    "Relevance score must be between 0.0 and 1.0".to_string(),
                ));
            }
        }

        let conn = self.writer().await;

        if !memory_exists(&conn, source_id).await? || !memory_exists(&conn, target_id).await? {
            return Err(Error::NotFound("Memory not found".to_string()));
        }
        if link_exists_either_direction(&conn, source_id, target_id).await? {
            return Err(Error::Conflict("Link already exists".to_string()));
        }

        let created_at = now_ts();
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {e}")))?;

        let insert = async {
            conn.execute(
                r#"
                INSERT INTO memory_links
                    (source_memory_id, target_memory_id, link_type, relevance_score, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
                libsql::params![
                    source_id,
                    target_id,
                    link_type.as_str(),
                    relevance_score,
                    created_at
                ],
            )
            .await
            .map_err(storage_err)?;
            let forward_id = conn.last_insert_rowid();
            conn.execute(
                r#"
                INSERT INTO memory_links
                    (source_memory_id, target_memory_id, link_type, relevance_score, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
                libsql::params![
                    target_id,
                    source_id,
                    link_type.as_str(),
                    relevance_score,
                    created_at
                ],
            )
            .await
            .map_err(storage_err)?;
            Ok::<i64, Error>(forward_id)
        }
        .await;

        match insert {
            Ok(forward_id) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| Error::Storage(format!("Failed to commit: {e}")))?;
                info!("Linked memories {source_id} <-> {target_id}");
                Ok(MemoryLink {
                    id: forward_id,
                    source_memory_id: source_id,
                    target_memory_id: target_id,
                    link_type,
                    relevance_score,
                    created_at: ts_to_datetime(created_at),
                })
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    /// Delete both directional rows; `NotFound` when no row exists.
    pub async fn delete_link(&self, source_id: i64, target_id: i64) -> Result<()> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                r#"
                DELETE FROM memory_links
                WHERE (source_memory_id = ?1 AND target_memory_id = ?2)
                   OR (source_memory_id = ?2 AND target_memory_id = ?1)
                "#,
                libsql::params![source_id, target_id],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(Error::NotFound("Link not found".to_string()));
        }
        info!("Unlinked memories {source_id} <-> {target_id}");
        Ok(())
    }

    /// Links for a memory with the connected memory's details.
    pub async fn memory_links(&self, memory_id: i64) -> Result<Vec<LinkedMemory>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT l.id, m.id, m.title, m.type, l.link_type, l.relevance_score, l.created_at
                FROM memory_links l
                JOIN memories m ON l.target_memory_id = m.id
                WHERE l.source_memory_id = ?
                ORDER BY l.created_at DESC, l.id DESC
                "#,
                libsql::params![memory_id],
            )
            .await
            .map_err(storage_err)?;

        let mut links = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            links.push(LinkedMemory {
                id: row.get(0).map_err(storage_err)?,
                memory_id: row.get(1).map_err(storage_err)?,
                title: row.get::<String>(2).ok(),
                memory_type: row
                    .get::<String>(3)
                    .map_err(storage_err)?
                    .parse()
                    .unwrap_or(think_core::types::MemoryType::Web),
                link_type: row
                    .get::<String>(4)
                    .map_err(storage_err)?
                    .parse()
                    .unwrap_or(LinkType::Manual),
                relevance_score: row.get::<f64>(5).ok(),
                created_at: ts_to_datetime(row.get(6).map_err(storage_err)?),
            });
        }
        Ok(links)
    }

    /// Ids of memories linked to the given memory.
    pub async fn linked_memory_ids(&self, memory_id: i64) -> Result<Vec<i64>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                "SELECT target_memory_id FROM memory_links WHERE source_memory_id = ?",
                libsql::params![memory_id],
            )
            .await
            .map_err(storage_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            ids.push(row.get(0).map_err(storage_err)?);
        }
        Ok(ids)
    }

    /// Create multiple auto links in one transaction, aggregating failures.
    pub async fn batch_create_links(&self, pairs: &[(i64, i64, f64)]) -> Result<BatchLinkOutcome> {
        let conn = self.writer().await;
        let mut outcome = BatchLinkOutcome::default();

        conn.execute("BEGIN", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {e}")))?;

        for &(source_id, target_id, confidence) in pairs {
            if source_id == target_id {
                outcome.errors.push(format!("Cannot link {source_id} to itself"));
                outcome.failed += 1;
                continue;
            }
            let exists = link_exists_either_direction(&conn, source_id, target_id).await;
            match exists {
                Ok(true) => {
                    outcome.errors.push(format!(
                        "Link between {source_id} and {target_id} already exists"
                    ));
                    outcome.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Batch link lookup failed: {e}");
                    outcome.errors.push(e.to_string());
                    outcome.failed += 1;
                    continue;
                }
                Ok(false) => {}
            }
            if !memory_exists(&conn, source_id).await.unwrap_or(false) {
                outcome
                    .errors
                    .push(format!("Source memory {source_id} does not exist"));
                outcome.failed += 1;
                continue;
            }
            if !memory_exists(&conn, target_id).await.unwrap_or(false) {
                outcome
                    .errors
                    .push(format!("Target memory {target_id} does not exist"));
                outcome.failed += 1;
                continue;
            }

            let created_at = now_ts();
            let result = async {
                for (a, b) in [(source_id, target_id), (target_id, source_id)] {
                    conn.execute(
                        r#"
                        INSERT INTO memory_links
                            (source_memory_id, target_memory_id, link_type, relevance_score, created_at)
                        VALUES (?, ?, 'auto', ?, ?)
                        "#,
                        libsql::params![a, b, confidence, created_at],
                    )
                    .await
                    .map_err(storage_err)?;
                }
                Ok::<(), Error>(())
            }
            .await;

            match result {
                Ok(()) => outcome.created += 1,
                Err(e) => {
                    outcome.errors.push(format!(
                        "Database error creating link {source_id}-{target_id}: {e}"
                    ));
                    outcome.failed += 1;
                }
            }
        }

        conn.execute("COMMIT", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to commit: {e}")))?;

        info!(
            "Batch link creation: {} created, {} failed",
            outcome.created, outcome.failed
        );
        Ok(outcome)
    }
}
