//! Conversation, message, and message-source CRUD.

use think_core::types::{
    Conversation, ConversationDetail, ConversationSummary, Message, RetrievedSource, Role,
    SourceRef, TokenUsage,
};
use think_core::{Error, Result};
use tracing::debug;

use super::{now_ts, storage_err, ts_to_datetime};
use crate::LibsqlStore;

/// Last-message preview length in the conversation listing.
const PREVIEW_LEN: usize = 100;

fn preview_of(content: &str) -> String {
    content.chars().take(PREVIEW_LEN).collect()
}

impl LibsqlStore {
    pub async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let conn = self.writer().await;
        let created_at = now_ts();
        conn.execute(
            "INSERT INTO conversations (title, pinned, created_at, updated_at) VALUES (?, 0, ?, ?)",
            libsql::params![title, created_at, created_at],
        )
        .await
        .map_err(storage_err)?;

        Ok(Conversation {
            id: conn.last_insert_rowid(),
            title: title.to_string(),
            pinned: false,
            created_at: ts_to_datetime(created_at),
            updated_at: ts_to_datetime(created_at),
        })
    }

    /// Conversations ordered pinned-first then by recency, with message
    /// counts and batched last-message previews.
    pub async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT c.id, c.title, c.pinned, c.created_at, c.updated_at,
                       COUNT(m.id) AS message_count
                FROM conversations c
                LEFT JOIN messages m ON c.id = m.conversation_id
                GROUP BY c.id
                ORDER BY c.pinned DESC, c.updated_at DESC
                LIMIT ? OFFSET ?
                "#,
                libsql::params![limit as i64, offset as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            summaries.push(ConversationSummary {
                id: row.get(0).map_err(storage_err)?,
                title: row.get(1).map_err(storage_err)?,
                pinned: row.get::<i64>(2).map_err(storage_err)? != 0,
                created_at: ts_to_datetime(row.get(3).map_err(storage_err)?),
                updated_at: ts_to_datetime(row.get(4).map_err(storage_err)?),
                message_count: row.get(5).map_err(storage_err)?,
                last_message: None,
            });
        }
        if summaries.is_empty() {
            return Ok(summaries);
        }

        // Batched previews: the newest message per conversation on the page
        let ids: Vec<String> = summaries.iter().map(|c| c.id.to_string()).collect();
        let id_list = ids.join(", ");
        // Bare column with MAX(id): SQLite picks content from the max-id
        // row, which breaks same-second ties deterministically
        let preview_sql = format!(
            r#"
            SELECT m.conversation_id, m.content, MAX(m.id)
            FROM messages m
            JOIN (
                SELECT conversation_id, MAX(created_at) AS max_created_at
                FROM messages
                WHERE conversation_id IN ({id_list})
                GROUP BY conversation_id
            ) latest
              ON m.conversation_id = latest.conversation_id
             AND m.created_at = latest.max_created_at
            GROUP BY m.conversation_id
            "#
        );
        let mut rows = conn.query(&preview_sql, ()).await.map_err(storage_err)?;
        let mut previews: std::collections::HashMap<i64, String> =
            std::collections::HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let conversation_id: i64 = row.get(0).map_err(storage_err)?;
            let content: String = row.get(1).map_err(storage_err)?;
            previews.insert(conversation_id, preview_of(&content));
        }

        for summary in &mut summaries {
            summary.last_message = previews.remove(&summary.id);
        }
        Ok(summaries)
    }

    /// Full conversation with ordered messages and their sources.
    pub async fn get_conversation(&self, id: i64) -> Result<Option<ConversationDetail>> {
        let conn = self.reader().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, pinned, created_at, updated_at FROM conversations WHERE id = ?",
                libsql::params![id],
            )
            .await
            .map_err(storage_err)?;
        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };

        let mut detail = ConversationDetail {
            id: row.get(0).map_err(storage_err)?,
            title: row.get(1).map_err(storage_err)?,
            pinned: row.get::<i64>(2).map_err(storage_err)? != 0,
            created_at: ts_to_datetime(row.get(3).map_err(storage_err)?),
            updated_at: ts_to_datetime(row.get(4).map_err(storage_err)?),
            messages: Vec::new(),
        };

        let mut rows = conn
            .query(
                r#"
                SELECT id, role, content, created_at, prompt_tokens, completion_tokens, total_tokens
                FROM messages WHERE conversation_id = ?
                ORDER BY created_at ASC, id ASC
                "#,
                libsql::params![id],
            )
            .await
            .map_err(storage_err)?;

        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let role: Role = row
                .get::<String>(1)
                .map_err(storage_err)?
                .parse()
                .unwrap_or(Role::User);
            detail.messages.push(Message {
                id: row.get(0).map_err(storage_err)?,
                conversation_id: id,
                role,
                content: row.get(2).map_err(storage_err)?,
                created_at: ts_to_datetime(row.get(3).map_err(storage_err)?),
                sources: Vec::new(),
                prompt_tokens: row.get::<i64>(4).ok(),
                completion_tokens: row.get::<i64>(5).ok(),
                total_tokens: row.get::<i64>(6).ok(),
            });
        }

        // Sources per message (memory snapshots)
        for message in &mut detail.messages {
            let mut rows = conn
                .query(
                    r#"
                    SELECT mem.id, mem.title, mem.url
                    FROM message_sources ms
                    JOIN memories mem ON ms.memory_id = mem.id
                    WHERE ms.message_id = ?
                    "#,
                    libsql::params![message.id],
                )
                .await
                .map_err(storage_err)?;
            while let Some(row) = rows.next().await.map_err(storage_err)? {
                message.sources.push(SourceRef {
                    id: row.get(0).map_err(storage_err)?,
                    title: row.get::<String>(1).ok(),
                    url: row.get::<String>(2).ok(),
                });
            }
        }

        Ok(Some(detail))
    }

    pub async fn delete_conversation(&self, id: i64) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "DELETE FROM conversations WHERE id = ?",
                libsql::params![id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn update_conversation_title(&self, id: i64, title: &str) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE conversations SET title = ? WHERE id = ?",
                libsql::params![title, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn set_conversation_pinned(&self, id: i64, pinned: bool) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE conversations SET pinned = ? WHERE id = ?",
                libsql::params![i64::from(pinned), id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Insert a message, its sources, and the conversation's `updated_at`
    /// bump in one transaction.
    pub async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        sources: &[RetrievedSource],
        usage: Option<TokenUsage>,
    ) -> Result<Option<Message>> {
        let conn = self.writer().await;

        let mut exists = conn
            .query(
                "SELECT id FROM conversations WHERE id = ?",
                libsql::params![conversation_id],
            )
            .await
            .map_err(storage_err)?;
        if exists.next().await.map_err(storage_err)?.is_none() {
            return Ok(None);
        }

        let created_at = now_ts();
        conn.execute("BEGIN", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {e}")))?;

        let insert = async {
            conn.execute(
                r#"
                INSERT INTO messages
                    (conversation_id, role, content, created_at, prompt_tokens, completion_tokens, total_tokens)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
                libsql::params![
                    conversation_id,
                    role.as_str(),
                    content,
                    created_at,
                    usage.map(|u| i64::from(u.prompt_tokens)),
                    usage.map(|u| i64::from(u.completion_tokens)),
                    usage.map(|u| i64::from(u.total_tokens)),
                ],
            )
            .await
            .map_err(storage_err)?;
            let message_id = conn.last_insert_rowid();

            for source in sources {
                conn.execute(
                    "INSERT OR IGNORE INTO message_sources (message_id, memory_id, relevance_score) VALUES (?, ?, ?)",
                    libsql::params![message_id, source.id, source.distance],
                )
                .await
                .map_err(storage_err)?;
            }

            conn.execute(
                "UPDATE conversations SET updated_at = ? WHERE id = ?",
                libsql::params![created_at, conversation_id],
            )
            .await
            .map_err(storage_err)?;

            Ok::<i64, Error>(message_id)
        }
        .await;

        match insert {
            Ok(message_id) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| Error::Storage(format!("Failed to commit: {e}")))?;
                debug!("Added {} message {message_id} to conversation {conversation_id}", role.as_str());
                Ok(Some(Message {
                    id: message_id,
                    conversation_id,
                    role,
                    content: content.to_string(),
                    created_at: ts_to_datetime(created_at),
                    sources: sources
                        .iter()
                        .map(|s| SourceRef {
                            id: s.id,
                            title: s.title.clone(),
                            url: s.url.clone(),
                        })
                        .collect(),
                    prompt_tokens: usage.map(|u| i64::from(u.prompt_tokens)),
                    completion_tokens: usage.map(|u| i64::from(u.completion_tokens)),
                    total_tokens: usage.map(|u| i64::from(u.total_tokens)),
                }))
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }
}
