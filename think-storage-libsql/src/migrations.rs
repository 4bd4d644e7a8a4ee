//! Forward-only, numbered, idempotent schema migrations.
//!
//! Migrations run automatically at unlock. Every step inspects the schema
//! before altering it, so re-running any prefix of the list is safe, and the
//! applied set is recorded in the `schema_version` ledger.

use libsql::Connection;
use think_core::llm::providers;
use think_core::{Error, Result};
use tracing::{info, warn};

use crate::fts5_schema;
use crate::schema;

/// Registry of (version, description); `apply` dispatches on version.
pub const MIGRATIONS: &[(i64, &str)] = &[
    (1, "Create memories table"),
    (2, "Add tags and memory_tags tables"),
    (3, "Add embedding column to memories"),
    (4, "Add settings table"),
    (5, "Add original_title column to memories"),
    (6, "Create conversations and messages tables"),
    (7, "Create message_sources table for persisting chat sources"),
    (8, "Add FTS5 full-text search for memories"),
    (9, "Add token usage columns to messages"),
    (10, "Add embedding_model column to memories"),
    (11, "Create jobs table for background task tracking"),
    (12, "Add pinned column to conversations"),
    (13, "Add embedding_summary column to memories"),
    (14, "Add processing_attempts column to memories"),
    (15, "Handle FTS5 unavailability gracefully"),
    (16, "Migrate legacy openai provider to specific cloud providers"),
    (17, "Add media memory columns for voice, audio, and video"),
    (18, "Add memory_links table and document columns"),
];

const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

fn storage_err(e: libsql::Error) -> Error {
    Error::Storage(e.to_string())
}

pub(crate) async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            libsql::params![name],
        )
        .await
        .map_err(storage_err)?;
    Ok(rows.next().await.map_err(storage_err)?.is_some())
}

pub(crate) async fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut rows = conn
        .query(&format!("PRAGMA table_info({table})"), ())
        .await
        .map_err(storage_err)?;
    while let Some(row) = rows.next().await.map_err(storage_err)? {
        let name: String = row.get(1).map_err(storage_err)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Probe whether this SQLite build ships the FTS5 module.
pub(crate) async fn fts5_available(conn: &Connection) -> bool {
    let probe = conn.execute(fts5_schema::FTS5_PROBE_CREATE, ()).await;
    let _ = conn.execute(fts5_schema::FTS5_PROBE_DROP, ()).await;
    probe.is_ok()
}

async fn add_column_if_missing(conn: &Connection, table: &str, column: &str, ddl_type: &str) -> Result<()> {
    if !column_exists(conn, table, column).await? {
        conn.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {ddl_type}"),
            (),
        )
        .await
        .map_err(storage_err)?;
    }
    Ok(())
}

async fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            "SELECT value FROM settings WHERE key = ?",
            libsql::params![key],
        )
        .await
        .map_err(storage_err)?;
    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(row.get(0).map_err(storage_err)?)),
        None => Ok(None),
    }
}

async fn put_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
        libsql::params![key, value],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

async fn apply(conn: &Connection, version: i64) -> Result<()> {
    match version {
        1 => {
            conn.execute(schema::CREATE_MEMORIES_TABLE, ())
                .await
                .map_err(storage_err)?;
        }
        2 => {
            conn.execute(schema::CREATE_TAGS_TABLE, ())
                .await
                .map_err(storage_err)?;
            conn.execute(schema::CREATE_MEMORY_TAGS_TABLE, ())
                .await
                .map_err(storage_err)?;
        }
        3 => add_column_if_missing(conn, "memories", "embedding", "BLOB").await?,
        4 => {
            conn.execute(schema::CREATE_SETTINGS_TABLE, ())
                .await
                .map_err(storage_err)?;
        }
        5 => add_column_if_missing(conn, "memories", "original_title", "TEXT").await?,
        6 => {
            conn.execute(schema::CREATE_CONVERSATIONS_TABLE, ())
                .await
                .map_err(storage_err)?;
            conn.execute(schema::CREATE_MESSAGES_TABLE, ())
                .await
                .map_err(storage_err)?;
        }
        7 => {
            conn.execute(schema::CREATE_MESSAGE_SOURCES_TABLE, ())
                .await
                .map_err(storage_err)?;
            conn.execute(schema::CREATE_MESSAGE_SOURCES_INDEX, ())
                .await
                .map_err(storage_err)?;
        }
        8 => {
            if table_exists(conn, "memories_fts").await? {
                return Ok(());
            }
            if !fts5_available(conn).await {
                warn!("FTS5 module not available - full-text search will be disabled");
                return Ok(());
            }
            conn.execute(fts5_schema::CREATE_MEMORIES_FTS_TABLE, ())
                .await
                .map_err(storage_err)?;
            conn.execute(fts5_schema::POPULATE_MEMORIES_FTS, ())
                .await
                .map_err(storage_err)?;
            conn.execute(fts5_schema::CREATE_MEMORIES_FTS_INSERT_TRIGGER, ())
                .await
                .map_err(storage_err)?;
            conn.execute(fts5_schema::CREATE_MEMORIES_FTS_DELETE_TRIGGER, ())
                .await
                .map_err(storage_err)?;
            conn.execute(fts5_schema::CREATE_MEMORIES_FTS_UPDATE_TRIGGER, ())
                .await
                .map_err(storage_err)?;
        }
        9 => {
            add_column_if_missing(conn, "messages", "prompt_tokens", "INTEGER").await?;
            add_column_if_missing(conn, "messages", "completion_tokens", "INTEGER").await?;
            add_column_if_missing(conn, "messages", "total_tokens", "INTEGER").await?;
        }
        10 => add_column_if_missing(conn, "memories", "embedding_model", "TEXT").await?,
        11 => {
            conn.execute(schema::CREATE_JOBS_TABLE, ())
                .await
                .map_err(storage_err)?;
            conn.execute(schema::CREATE_JOBS_STATUS_INDEX, ())
                .await
                .map_err(storage_err)?;
            conn.execute(schema::CREATE_JOBS_TYPE_STATUS_INDEX, ())
                .await
                .map_err(storage_err)?;
        }
        12 => {
            add_column_if_missing(conn, "conversations", "pinned", "INTEGER DEFAULT 0").await?;
            conn.execute(schema::CREATE_CONVERSATIONS_PINNED_INDEX, ())
                .await
                .map_err(storage_err)?;
        }
        13 => add_column_if_missing(conn, "memories", "embedding_summary", "TEXT").await?,
        14 => {
            add_column_if_missing(conn, "memories", "processing_attempts", "INTEGER DEFAULT 0")
                .await?;
        }
        15 => {
            // Drop FTS artifacts when the module disappeared (e.g. a SQLite
            // build swap); search falls back to vector-only
            let mut rows = conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type = 'trigger' AND name LIKE 'memories_fts%'",
                    (),
                )
                .await
                .map_err(storage_err)?;
            let has_triggers = rows.next().await.map_err(storage_err)?.is_some();
            if !has_triggers {
                return Ok(());
            }
            if fts5_available(conn).await {
                return Ok(());
            }

            info!("FTS5 unavailable - removing FTS5 triggers for graceful fallback");
            for trigger in fts5_schema::FTS_TRIGGERS {
                conn.execute(&format!("DROP TRIGGER IF EXISTS {trigger}"), ())
                    .await
                    .map_err(storage_err)?;
            }
            conn.execute(fts5_schema::DROP_MEMORIES_FTS_TABLE, ())
                .await
                .map_err(storage_err)?;
        }
        16 => migrate_legacy_provider(conn).await?,
        17 => {
            // Audio/voice columns
            add_column_if_missing(conn, "memories", "audio_path", "TEXT").await?;
            add_column_if_missing(conn, "memories", "audio_format", "TEXT").await?;
            add_column_if_missing(conn, "memories", "audio_duration", "REAL").await?;
            add_column_if_missing(conn, "memories", "transcript", "TEXT").await?;
            add_column_if_missing(conn, "memories", "transcription_status", "TEXT").await?;
            add_column_if_missing(conn, "memories", "transcript_segments", "TEXT").await?;
            add_column_if_missing(conn, "memories", "media_source", "TEXT").await?;
            // Video columns
            add_column_if_missing(conn, "memories", "video_path", "TEXT").await?;
            add_column_if_missing(conn, "memories", "video_format", "TEXT").await?;
            add_column_if_missing(conn, "memories", "video_duration", "REAL").await?;
            add_column_if_missing(conn, "memories", "thumbnail_path", "TEXT").await?;
            add_column_if_missing(conn, "memories", "video_width", "INTEGER").await?;
            add_column_if_missing(conn, "memories", "video_height", "INTEGER").await?;
            add_column_if_missing(conn, "memories", "video_processing_status", "TEXT").await?;
        }
        18 => {
            conn.execute(schema::CREATE_MEMORY_LINKS_TABLE, ())
                .await
                .map_err(storage_err)?;
            conn.execute(schema::CREATE_MEMORY_LINKS_SOURCE_INDEX, ())
                .await
                .map_err(storage_err)?;
            add_column_if_missing(conn, "memories", "document_path", "TEXT").await?;
            add_column_if_missing(conn, "memories", "document_format", "TEXT").await?;
            add_column_if_missing(conn, "memories", "document_page_count", "INTEGER").await?;
        }
        other => {
            return Err(Error::Storage(format!("Unknown migration version {other}")));
        }
    }
    Ok(())
}

/// Translate legacy `openai` provider settings to the specific cloud
/// provider named in the stored base URL. Existing target keys are never
/// overwritten.
async fn migrate_legacy_provider(conn: &Connection) -> Result<()> {
    let ai_provider = get_setting(conn, "ai_provider").await?;
    let base_url = get_setting(conn, "openai_base_url")
        .await?
        .unwrap_or_default();
    let base_url_lower = base_url.to_lowercase();

    let was_openai = ai_provider.as_deref() == Some("openai");
    let new_provider = if base_url_lower.contains("openrouter") {
        Some("openrouter")
    } else if base_url_lower.contains("venice") {
        Some("venice")
    } else {
        None
    };

    if !was_openai && new_provider.is_none() {
        return Ok(());
    }

    let Some(new_provider) = new_provider else {
        if was_openai {
            warn!(
                "Cannot determine cloud provider from base URL '{base_url}'. \
                 Skipping migration - configure the provider manually in Settings."
            );
        }
        return Ok(());
    };

    info!("Migrating legacy openai settings to '{new_provider}' provider");
    let config = providers::get_provider_config(new_provider);

    if was_openai {
        put_setting(conn, "ai_provider", new_provider).await?;
        // Venice has no embedding surface; route embeddings via openrouter
        let embedding_provider = if new_provider == "venice" {
            "openrouter"
        } else {
            new_provider
        };
        put_setting(conn, "embedding_provider", embedding_provider).await?;
    }

    let model_key = format!("{new_provider}_model");
    if get_setting(conn, &model_key).await?.is_none() {
        let value = match get_setting(conn, "openai_model").await? {
            Some(old) => Some(old),
            None => config
                .and_then(|c| c.default_chat_model)
                .map(|m| m.to_string()),
        };
        if let Some(value) = value {
            put_setting(conn, &model_key, &value).await?;
        }
    }

    let embedding_key = format!("{new_provider}_embedding_model");
    if get_setting(conn, &embedding_key).await?.is_none() {
        let value = match get_setting(conn, "openai_embedding_model").await? {
            Some(old) => Some(old),
            None => config
                .and_then(|c| c.default_embedding_model)
                .map(|m| m.to_string()),
        };
        if let Some(value) = value {
            put_setting(conn, &embedding_key, &value).await?;
        }
    }

    let api_key_name = format!("api_key_{new_provider}");
    if get_setting(conn, &api_key_name).await?.is_none() {
        if let Some(old_key) = get_setting(conn, "api_key_openai").await? {
            put_setting(conn, &api_key_name, &old_key).await?;
        }
    }

    Ok(())
}

/// Re-run the legacy provider translation against an open store. The step
/// is idempotent; exposed for support tooling and tests.
pub async fn rerun_legacy_provider_migration(store: &crate::LibsqlStore) -> Result<()> {
    let conn = store.writer().await;
    migrate_legacy_provider(&conn).await
}

/// Run all pending migrations, returning the applied (version, description)
/// pairs.
pub async fn run_migrations(conn: &Connection) -> Result<Vec<(i64, String)>> {
    conn.execute(SCHEMA_VERSION_TABLE, ())
        .await
        .map_err(storage_err)?;

    let mut rows = conn
        .query("SELECT MAX(version) FROM schema_version", ())
        .await
        .map_err(storage_err)?;
    let current: i64 = match rows.next().await.map_err(storage_err)? {
        Some(row) => row.get::<i64>(0).unwrap_or(0),
        None => 0,
    };
    drop(rows);

    let mut applied = Vec::new();
    for &(version, description) in MIGRATIONS {
        if version <= current {
            continue;
        }
        apply(conn, version).await?;
        conn.execute(
            "INSERT INTO schema_version (version, description) VALUES (?, ?)",
            libsql::params![version, description],
        )
        .await
        .map_err(storage_err)?;
        applied.push((version, description.to_string()));
    }

    if !applied.is_empty() {
        info!("Applied {} schema migration(s)", applied.len());
    }
    Ok(applied)
}
