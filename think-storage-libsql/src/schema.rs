//! Database schema definitions for the encrypted store.
//!
//! Each constant is applied by a numbered migration; the DDL itself uses
//! `IF NOT EXISTS` so re-running a step is always safe.

/// SQL to create the memories table (base columns; later migrations add the
/// embedding, media, and document columns)
pub const CREATE_MEMORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL DEFAULT 'web',
    url TEXT,
    title TEXT,
    content TEXT,
    summary TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

/// SQL to create the tags table
pub const CREATE_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
)
"#;

/// SQL to create the memory/tag join table
pub const CREATE_MEMORY_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memory_tags (
    memory_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    source TEXT NOT NULL DEFAULT 'manual',
    PRIMARY KEY (memory_id, tag_id),
    FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
)
"#;

/// SQL to create the settings table
pub const CREATE_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// SQL to create the conversations table
pub const CREATE_CONVERSATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

/// SQL to create the messages table
pub const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
)
"#;

/// SQL to create the message_sources table
pub const CREATE_MESSAGE_SOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS message_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id INTEGER NOT NULL,
    memory_id INTEGER NOT NULL,
    relevance_score REAL,
    UNIQUE(message_id, memory_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE
)
"#;

/// Index on message_sources for per-message lookups
pub const CREATE_MESSAGE_SOURCES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_message_sources_message_id
ON message_sources(message_id)
"#;

/// SQL to create the jobs table
pub const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    params TEXT,
    result TEXT,
    error TEXT,
    progress INTEGER DEFAULT 0,
    processed INTEGER DEFAULT 0,
    failed INTEGER DEFAULT 0,
    total INTEGER DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    started_at INTEGER,
    completed_at INTEGER
)
"#;

/// Index on jobs status
pub const CREATE_JOBS_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)
"#;

/// Index on jobs type + status for active-job lookups
pub const CREATE_JOBS_TYPE_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_jobs_type_status ON jobs(type, status)
"#;

/// Index on conversations pinned flag
pub const CREATE_CONVERSATIONS_PINNED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_pinned ON conversations(pinned)
"#;

/// SQL to create the memory_links table (two directed rows per logical link)
pub const CREATE_MEMORY_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memory_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_memory_id INTEGER NOT NULL,
    target_memory_id INTEGER NOT NULL,
    link_type TEXT NOT NULL DEFAULT 'manual',
    relevance_score REAL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE(source_memory_id, target_memory_id),
    FOREIGN KEY (source_memory_id) REFERENCES memories(id) ON DELETE CASCADE,
    FOREIGN KEY (target_memory_id) REFERENCES memories(id) ON DELETE CASCADE
)
"#;

/// Index for the single-direction link scan
pub const CREATE_MEMORY_LINKS_SOURCE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memory_links_source
ON memory_links(source_memory_id, created_at DESC)
"#;

/// The full memories column list used by every SELECT that maps a row to a
/// Memory. Keep in sync with `store::row_to_memory`.
pub const MEMORY_COLUMNS: &str = "id, type, url, title, original_title, content, summary, \
    embedding_summary, embedding, embedding_model, processing_attempts, created_at, \
    audio_path, audio_format, audio_duration, transcript, transcription_status, \
    transcript_segments, media_source, video_path, video_format, video_duration, \
    video_width, video_height, thumbnail_path, video_processing_status, \
    document_path, document_format, document_page_count";
