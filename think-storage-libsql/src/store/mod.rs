//! Typed CRUD over the encrypted store, split by entity.
//!
//! Every module adds inherent methods to [`crate::LibsqlStore`]; the
//! `MemoryStore` trait implementation delegates to them.

pub mod conversations;
pub mod graph;
pub mod jobs;
pub mod links;
pub mod memories;
pub mod media;
pub mod search;
pub mod settings;
pub mod tags;

use chrono::{DateTime, Utc};
use think_core::types::{
    deserialize_embedding, AudioDetails, DocumentDetails, Memory, MemoryKind, TranscriptSegment,
    VideoDetails,
};
use think_core::{Error, Result};

pub(crate) fn storage_err(e: libsql::Error) -> Error {
    Error::Storage(e.to_string())
}

pub(crate) fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

pub(crate) fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn opt_string(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

fn opt_f64(row: &libsql::Row, idx: i32) -> Option<f64> {
    row.get::<f64>(idx).ok()
}

fn opt_i64(row: &libsql::Row, idx: i32) -> Option<i64> {
    row.get::<i64>(idx).ok()
}

fn parse_status<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|s| s.parse().ok())
}

/// Map a full memories row (see [`crate::schema::MEMORY_COLUMNS`]) to a
/// [`Memory`]; tags are attached by the caller.
pub(crate) fn row_to_memory(row: &libsql::Row) -> Result<Memory> {
    let id: i64 = row.get(0).map_err(storage_err)?;
    let type_str: String = row.get(1).map_err(storage_err)?;
    let url = opt_string(row, 2);
    let title = opt_string(row, 3);
    let original_title = opt_string(row, 4);
    let content = opt_string(row, 5);
    let summary = opt_string(row, 6);
    let embedding_summary = opt_string(row, 7);
    let embedding_bytes: Option<Vec<u8>> = row.get::<Vec<u8>>(8).ok();
    let embedding_model = opt_string(row, 9);
    let processing_attempts = opt_i64(row, 10).unwrap_or(0);
    let created_at: i64 = row.get(11).map_err(storage_err)?;

    let audio = AudioDetails {
        audio_path: opt_string(row, 12),
        audio_format: opt_string(row, 13),
        audio_duration: opt_f64(row, 14),
        transcript: opt_string(row, 15),
        transcription_status: parse_status(opt_string(row, 16)),
        transcript_segments: opt_string(row, 17)
            .and_then(|json| serde_json::from_str::<Vec<TranscriptSegment>>(&json).ok()),
        media_source: parse_status(opt_string(row, 18)),
    };
    let video = VideoDetails {
        video_path: opt_string(row, 19),
        video_format: opt_string(row, 20),
        video_duration: opt_f64(row, 21),
        video_width: opt_i64(row, 22),
        video_height: opt_i64(row, 23),
        thumbnail_path: opt_string(row, 24),
        video_processing_status: parse_status(opt_string(row, 25)),
    };
    let document = DocumentDetails {
        document_path: opt_string(row, 26),
        document_format: opt_string(row, 27),
        document_page_count: opt_i64(row, 28),
        thumbnail_path: opt_string(row, 24),
    };

    let kind = match type_str.as_str() {
        "web" => MemoryKind::Web,
        "note" => MemoryKind::Note,
        "voice_memo" => MemoryKind::VoiceMemo(audio),
        "audio" => MemoryKind::Audio(audio),
        "video" => MemoryKind::Video { audio, video },
        "document" => MemoryKind::Document(document),
        other => {
            return Err(Error::Storage(format!(
                "Unknown memory type in row {id}: {other}"
            )))
        }
    };

    Ok(Memory {
        id,
        kind,
        url,
        title,
        original_title,
        content,
        summary,
        embedding_summary,
        embedding: embedding_bytes.map(|b| deserialize_embedding(&b)),
        embedding_model,
        processing_attempts,
        created_at: ts_to_datetime(created_at),
        tags: Vec::new(),
    })
}
