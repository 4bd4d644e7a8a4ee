use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{
    MediaSource, MemoryType, TagSource, TranscriptionStatus, VideoProcessingStatus,
};

/// One timed span of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Audio-track fields shared by voice memos, audio uploads, and videos.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioDetails {
    pub audio_path: Option<String>,
    pub audio_format: Option<String>,
    pub audio_duration: Option<f64>,
    pub transcript: Option<String>,
    pub transcription_status: Option<TranscriptionStatus>,
    pub transcript_segments: Option<Vec<TranscriptSegment>>,
    pub media_source: Option<MediaSource>,
}

/// Video-specific fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoDetails {
    pub video_path: Option<String>,
    pub video_format: Option<String>,
    pub video_duration: Option<f64>,
    pub video_width: Option<i64>,
    pub video_height: Option<i64>,
    pub thumbnail_path: Option<String>,
    pub video_processing_status: Option<VideoProcessingStatus>,
}

/// Document-specific fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub document_path: Option<String>,
    pub document_format: Option<String>,
    pub document_page_count: Option<i64>,
    pub thumbnail_path: Option<String>,
}

/// Type-specific payload of a memory.
///
/// The storage row is flat; this tagged form is what crosses module
/// boundaries so each worker only sees the fields its memory type carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryKind {
    Web,
    Note,
    VoiceMemo(AudioDetails),
    Audio(AudioDetails),
    Video {
        #[serde(flatten)]
        audio: AudioDetails,
        #[serde(flatten)]
        video: VideoDetails,
    },
    Document(DocumentDetails),
}

impl MemoryKind {
    pub fn memory_type(&self) -> MemoryType {
        match self {
            MemoryKind::Web => MemoryType::Web,
            MemoryKind::Note => MemoryType::Note,
            MemoryKind::VoiceMemo(_) => MemoryType::VoiceMemo,
            MemoryKind::Audio(_) => MemoryType::Audio,
            MemoryKind::Video { .. } => MemoryType::Video,
            MemoryKind::Document(_) => MemoryType::Document,
        }
    }

    /// Audio-track fields, for any kind that has them.
    pub fn audio(&self) -> Option<&AudioDetails> {
        match self {
            MemoryKind::VoiceMemo(audio) | MemoryKind::Audio(audio) => Some(audio),
            MemoryKind::Video { audio, .. } => Some(audio),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoDetails> {
        match self {
            MemoryKind::Video { video, .. } => Some(video),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&DocumentDetails> {
        match self {
            MemoryKind::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

/// A tag attached to a memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TagSource>,
}

/// A tag with its usage count across all memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagUsage {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
}

/// The universal content entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    #[serde(flatten)]
    pub kind: MemoryKind,
    pub url: Option<String>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub embedding_summary: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub processing_attempts: i64,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<TagInfo>,
}

impl Memory {
    pub fn memory_type(&self) -> MemoryType {
        self.kind.memory_type()
    }
}

/// Lightweight projection used for listings; excludes content and embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub url: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<TagInfo>,
    pub created_at: DateTime<Utc>,
    // Media fields, populated per type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_status: Option<TranscriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_source: Option<MediaSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_processing_status: Option<VideoProcessingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_page_count: Option<i64>,
}

/// Payload for creating a memory.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub memory_type: Option<MemoryType>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    // Media fields set by the ingest services
    pub audio_path: Option<String>,
    pub audio_format: Option<String>,
    pub audio_duration: Option<f64>,
    pub transcription_status: Option<TranscriptionStatus>,
    pub media_source: Option<MediaSource>,
    pub video_path: Option<String>,
    pub video_format: Option<String>,
    pub video_duration: Option<f64>,
    pub video_width: Option<i64>,
    pub video_height: Option<i64>,
    pub video_processing_status: Option<VideoProcessingStatus>,
    pub document_path: Option<String>,
    pub document_format: Option<String>,
    pub document_page_count: Option<i64>,
    pub thumbnail_path: Option<String>,
}

impl NewMemory {
    pub fn web(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        NewMemory {
            memory_type: Some(MemoryType::Web),
            url: Some(url.into()),
            original_title: Some(title.clone()),
            title: Some(title),
            content: Some(content.into()),
            ..NewMemory::default()
        }
    }

    pub fn note(title: impl Into<String>, content: impl Into<String>) -> Self {
        NewMemory {
            memory_type: Some(MemoryType::Note),
            title: Some(title.into()),
            content: Some(content.into()),
            ..NewMemory::default()
        }
    }

    pub fn resolved_type(&self) -> MemoryType {
        self.memory_type.unwrap_or(MemoryType::Web)
    }
}

/// Filters and pagination for memory listings.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub limit: usize,
    pub offset: usize,
    pub type_filter: Option<MemoryType>,
    pub date_filter: Option<super::enums::DateFilter>,
    pub tag_filter: Option<String>,
}

impl MemoryQuery {
    pub fn with_limit(limit: usize) -> Self {
        MemoryQuery {
            limit,
            ..MemoryQuery::default()
        }
    }
}

/// Counts driving the reprocess-all operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingCounts {
    pub need_summary: u64,
    pub need_embedding: u64,
    pub total: u64,
}

/// A memory selected for summary generation or re-embedding.
#[derive(Debug, Clone)]
pub struct ReembedCandidate {
    pub id: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub embedding_summary: Option<String>,
}

/// Serialize an embedding as packed little-endian f32 bytes.
pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserialize packed little-endian f32 bytes into an embedding.
pub fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trip_is_bit_exact() {
        let embedding = vec![0.0_f32, 1.5, -2.25, f32::MIN_POSITIVE, 1234.5678];
        let bytes = serialize_embedding(&embedding);
        assert_eq!(bytes.len(), embedding.len() * 4);
        assert_eq!(deserialize_embedding(&bytes), embedding);
    }

    #[test]
    fn kind_exposes_audio_for_video() {
        let kind = MemoryKind::Video {
            audio: AudioDetails {
                transcript: Some("hello".into()),
                ..AudioDetails::default()
            },
            video: VideoDetails::default(),
        };
        assert_eq!(kind.memory_type(), MemoryType::Video);
        assert_eq!(kind.audio().and_then(|a| a.transcript.as_deref()), Some("hello"));
        assert!(kind.document().is_none());
    }

    #[test]
    fn web_payload_captures_original_title() {
        let new = NewMemory::web("https://x/y", "X — Y | Site", "body");
        assert_eq!(new.original_title.as_deref(), Some("X — Y | Site"));
        assert_eq!(new.resolved_type(), MemoryType::Web);
    }
}
