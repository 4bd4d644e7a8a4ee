//! FTS5 virtual table for hybrid search.
//!
//! The index is external-content over the memories table and kept in sync
//! with insert/update/delete triggers. FTS5 is not compiled into every
//! SQLite build, so migrations probe availability first and both creation
//! and teardown are expressed here.

/// Probe statement: succeeds only when the FTS5 module is available.
pub const FTS5_PROBE_CREATE: &str = "CREATE VIRTUAL TABLE _fts5_probe USING fts5(probe)";

/// Cleanup for the probe table.
pub const FTS5_PROBE_DROP: &str = "DROP TABLE IF EXISTS _fts5_probe";

/// SQL to create the FTS5 index over memory titles and content.
pub const CREATE_MEMORIES_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE memories_fts USING fts5(
    title,
    content,
    content='memories',
    content_rowid='id'
)
"#;

/// Backfill the index from existing rows.
pub const POPULATE_MEMORIES_FTS: &str = r#"
INSERT INTO memories_fts(rowid, title, content)
SELECT id, COALESCE(title, ''), COALESCE(content, '')
FROM memories
"#;

/// Insert trigger keeping the index in sync.
pub const CREATE_MEMORIES_FTS_INSERT_TRIGGER: &str = r#"
CREATE TRIGGER memories_fts_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, title, content)
    VALUES (new.id, COALESCE(new.title, ''), COALESCE(new.content, ''));
END
"#;

/// Delete trigger (external-content tables require the special delete form).
pub const CREATE_MEMORIES_FTS_DELETE_TRIGGER: &str = r#"
CREATE TRIGGER memories_fts_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, title, content)
    VALUES ('delete', old.id, COALESCE(old.title, ''), COALESCE(old.content, ''));
END
"#;

/// Update trigger: delete the old row from the index, insert the new one.
pub const CREATE_MEMORIES_FTS_UPDATE_TRIGGER: &str = r#"
CREATE TRIGGER memories_fts_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, title, content)
    VALUES ('delete', old.id, COALESCE(old.title, ''), COALESCE(old.content, ''));
    INSERT INTO memories_fts(rowid, title, content)
    VALUES (new.id, COALESCE(new.title, ''), COALESCE(new.content, ''));
END
"#;

/// Trigger names, for the graceful-drop migration.
pub const FTS_TRIGGERS: &[&str] = &["memories_fts_ai", "memories_fts_ad", "memories_fts_au"];

/// SQL to drop the FTS table itself.
pub const DROP_MEMORIES_FTS_TABLE: &str = "DROP TABLE IF EXISTS memories_fts";
