//! Ingest services: validation, blob persistence, memory creation, and
//! worker scheduling for every memory type. These sit directly behind the
//! transport layer, so all limits are enforced here rather than in handlers.

use std::sync::Arc;
use tracing::{info, warn};

use crate::document::{extract_pdf_text, validate_document_format, DocumentProcessor,
    THUMBNAIL_MAX_SIZE};
use crate::enrichment::Enricher;
use crate::events::{EventBus, EventKind, HubEvent};
use crate::llm::LlmGateway;
use crate::storage::{BlobDomain, BlobStore, MemoryStore};
use crate::types::{
    MediaSource, Memory, MemoryType, NewMemory, TranscriptionStatus, VideoProcessingStatus,
};
use crate::error::{Error, Result};

pub const MAX_AUDIO_SIZE: usize = 100 * 1024 * 1024;
pub const MAX_VIDEO_SIZE: usize = 500 * 1024 * 1024;
pub const MAX_THUMBNAIL_SIZE: usize = 10 * 1024 * 1024;
pub const MAX_DOCUMENT_SIZE: usize = 50 * 1024 * 1024;

pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "m4a", "webm", "ogg", "flac"];
pub const VIDEO_FORMATS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi"];
/// Formats accepted for audio extracted from a video on the client.
const EXTRACTED_AUDIO_FORMATS: &[&str] = &["m4a", "mp3", "wav", "webm", "ogg", "aac"];
const THUMBNAIL_FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp"];

const MAX_VIDEO_DURATION_SECS: f64 = 86_400.0;
const MAX_VIDEO_WIDTH: i64 = 7_680;
const MAX_VIDEO_HEIGHT: i64 = 4_320;

/// Result of a create call: URL duplicates are reported, not errored.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Created(Memory),
    Duplicate(Memory),
}

impl IngestOutcome {
    pub fn memory(&self) -> &Memory {
        match self {
            IngestOutcome::Created(memory) | IngestOutcome::Duplicate(memory) => memory,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate(_))
    }
}

/// Text embedded at ingest, before the embedding summary exists.
pub fn format_for_embedding(title: Option<&str>, content: Option<&str>) -> String {
    format!("{}\n{}", title.unwrap_or(""), content.unwrap_or(""))
}

/// Ingest front-end for memories and media.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn MemoryStore>,
    vault: Arc<dyn BlobStore>,
    events: EventBus,
    enricher: Enricher,
    gateway: LlmGateway,
    documents: DocumentProcessor,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        vault: Arc<dyn BlobStore>,
        events: EventBus,
        enricher: Enricher,
        gateway: LlmGateway,
        documents: DocumentProcessor,
    ) -> Self {
        IngestService {
            store,
            vault,
            events,
            enricher,
            gateway,
            documents,
        }
    }

    fn emit_created(&self, memory: &Memory) {
        self.events.publish(HubEvent::new(
            EventKind::MemoryCreated,
            memory.id,
            serde_json::to_value(memory).ok(),
        ));
    }

    async fn emit_updated(&self, memory_id: i64) {
        let data = self
            .store
            .get_memory(memory_id)
            .await
            .ok()
            .flatten()
            .and_then(|m| serde_json::to_value(&m).ok());
        self.events
            .publish(HubEvent::new(EventKind::MemoryUpdated, memory_id, data));
    }

    /// Create a web clip or note.
    ///
    /// Duplicate URLs short-circuit to the existing memory. The ingest-time
    /// embedding over `title\ncontent` is best-effort; the enrichment worker
    /// re-embeds from the structured summary later.
    pub async fn create_memory(&self, mut new: NewMemory) -> Result<IngestOutcome> {
        if let Some(url) = new.url.as_deref() {
            if let Some(existing) = self.store.get_memory_by_url(url).await? {
                info!("Duplicate URL at ingest, returning memory {}", existing.id);
                return Ok(IngestOutcome::Duplicate(existing));
            }
        }

        if new.embedding.is_none() {
            let text = format_for_embedding(new.title.as_deref(), new.content.as_deref());
            if !text.trim().is_empty() {
                match self.gateway.embed(&text).await {
                    Ok(embedding) => {
                        new.embedding = Some(embedding);
                        new.embedding_model = Some(self.gateway.current_embedding_model());
                    }
                    Err(e) => warn!("Ingest-time embedding failed: {e}"),
                }
            }
        }

        let memory = self.store.create_memory(new).await?;
        self.emit_created(&memory);
        self.enricher.schedule(memory.id, memory.memory_type());
        Ok(IngestOutcome::Created(memory))
    }

    fn validate_audio(bytes: &[u8], format: &str) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::Validation("Empty audio file".to_string()));
        }
        if bytes.len() > MAX_AUDIO_SIZE {
            return Err(Error::Validation(format!(
                "File too large. Maximum size is {} MB",
                MAX_AUDIO_SIZE / (1024 * 1024)
            )));
        }
        if !AUDIO_FORMATS.contains(&format.to_lowercase().as_str()) {
            return Err(Error::Validation(format!(
                "Unsupported audio format. Supported: {}",
                AUDIO_FORMATS.join(", ")
            )));
        }
        Ok(())
    }

    async fn create_audio_memory(
        &self,
        bytes: &[u8],
        format: &str,
        memory_type: MemoryType,
        source: MediaSource,
        title: Option<String>,
        duration: Option<f64>,
    ) -> Result<Memory> {
        Self::validate_audio(bytes, format)?;

        let audio_path = self.vault.save(BlobDomain::Audio, bytes, format).await?;
        let memory = self
            .store
            .create_memory(NewMemory {
                memory_type: Some(memory_type),
                title,
                audio_path: Some(audio_path),
                audio_format: Some(format.to_lowercase()),
                audio_duration: duration,
                transcription_status: Some(TranscriptionStatus::Pending),
                media_source: Some(source),
                ..NewMemory::default()
            })
            .await?;

        self.emit_created(&memory);
        self.enricher.schedule(memory.id, memory_type);
        info!("Created {memory_type} memory {}", memory.id);
        Ok(memory)
    }

    /// In-app voice recording.
    pub async fn record_audio(
        &self,
        bytes: &[u8],
        format: &str,
        duration: Option<f64>,
    ) -> Result<Memory> {
        self.create_audio_memory(
            bytes,
            format,
            MemoryType::VoiceMemo,
            MediaSource::Recording,
            None,
            duration,
        )
        .await
    }

    /// Uploaded audio file; the filename stem becomes the provisional title.
    pub async fn upload_audio(
        &self,
        bytes: &[u8],
        format: &str,
        filename: Option<&str>,
    ) -> Result<Memory> {
        let title = filename.map(|f| stem_of(f).to_string());
        self.create_audio_memory(
            bytes,
            format,
            MemoryType::Audio,
            MediaSource::Upload,
            title,
            None,
        )
        .await
    }

    /// Upload a video. Duration and dimensions come from client metadata and
    /// are range-checked; the frontend uploads extracted audio and a
    /// thumbnail afterwards.
    pub async fn upload_video(
        &self,
        bytes: &[u8],
        format: &str,
        filename: &str,
        duration: Option<f64>,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Result<Memory> {
        if !VIDEO_FORMATS.contains(&format.to_lowercase().as_str()) {
            return Err(Error::Validation(format!(
                "Unsupported video format. Supported: {}",
                VIDEO_FORMATS.join(", ")
            )));
        }
        if bytes.is_empty() {
            return Err(Error::Validation("Empty video file".to_string()));
        }
        if bytes.len() > MAX_VIDEO_SIZE {
            return Err(Error::Validation(format!(
                "File too large. Maximum size is {} MB",
                MAX_VIDEO_SIZE / (1024 * 1024)
            )));
        }
        if duration.is_some_and(|d| !(0.0..=MAX_VIDEO_DURATION_SECS).contains(&d)) {
            return Err(Error::Validation("Invalid video duration".to_string()));
        }
        if width.is_some_and(|w| !(1..=MAX_VIDEO_WIDTH).contains(&w)) {
            return Err(Error::Validation("Invalid video width".to_string()));
        }
        if height.is_some_and(|h| !(1..=MAX_VIDEO_HEIGHT).contains(&h)) {
            return Err(Error::Validation("Invalid video height".to_string()));
        }

        let video_path = self.vault.save(BlobDomain::Video, bytes, format).await?;
        let memory = self
            .store
            .create_memory(NewMemory {
                memory_type: Some(MemoryType::Video),
                title: Some(stem_of(filename).to_string()),
                video_path: Some(video_path),
                video_format: Some(format.to_lowercase()),
                video_duration: duration,
                video_width: width,
                video_height: height,
                video_processing_status: Some(VideoProcessingStatus::PendingExtraction),
                media_source: Some(MediaSource::Upload),
                ..NewMemory::default()
            })
            .await?;

        self.emit_created(&memory);
        info!("Created video memory {} from {filename}", memory.id);
        Ok(memory)
    }

    /// Attach client-extracted audio to a video; kicks off transcription.
    pub async fn attach_video_audio(
        &self,
        memory_id: i64,
        bytes: &[u8],
        format: &str,
    ) -> Result<()> {
        self.require_video(memory_id).await?;

        if bytes.is_empty() {
            return Err(Error::Validation("Empty audio file".to_string()));
        }
        if bytes.len() > MAX_AUDIO_SIZE {
            return Err(Error::Validation(format!(
                "Audio file too large. Maximum size is {} MB",
                MAX_AUDIO_SIZE / (1024 * 1024)
            )));
        }
        let format = if EXTRACTED_AUDIO_FORMATS.contains(&format.to_lowercase().as_str()) {
            format.to_lowercase()
        } else {
            "m4a".to_string()
        };

        let audio_path = self.vault.save(BlobDomain::Audio, bytes, &format).await?;
        self.store
            .attach_video_audio(memory_id, &audio_path, &format)
            .await?;
        self.emit_updated(memory_id).await;
        self.enricher.schedule(memory_id, MemoryType::Video);
        info!("Added extracted audio to video memory {memory_id}");
        Ok(())
    }

    /// Attach a client-generated thumbnail to a video.
    pub async fn attach_video_thumbnail(
        &self,
        memory_id: i64,
        bytes: &[u8],
        format: &str,
    ) -> Result<()> {
        self.require_video(memory_id).await?;

        if bytes.is_empty() {
            return Err(Error::Validation("Empty thumbnail file".to_string()));
        }
        if bytes.len() > MAX_THUMBNAIL_SIZE {
            return Err(Error::Validation(format!(
                "Thumbnail too large. Maximum size is {} MB",
                MAX_THUMBNAIL_SIZE / (1024 * 1024)
            )));
        }
        let format = if THUMBNAIL_FORMATS.contains(&format.to_lowercase().as_str()) {
            format.to_lowercase()
        } else {
            "jpg".to_string()
        };

        let thumbnail_path = self
            .vault
            .save(BlobDomain::Thumbnail, bytes, &format)
            .await?;
        self.store
            .set_thumbnail_path(memory_id, &thumbnail_path)
            .await?;
        self.emit_updated(memory_id).await;
        info!("Added thumbnail to video memory {memory_id}");
        Ok(())
    }

    async fn require_video(&self, memory_id: i64) -> Result<Memory> {
        let memory = self
            .store
            .get_memory(memory_id)
            .await?
            .filter(|m| m.memory_type() == MemoryType::Video)
            .ok_or_else(|| Error::not_found("Video memory", memory_id))?;
        Ok(memory)
    }

    /// Upload a PDF document.
    ///
    /// Text extraction runs before anything is persisted: a scan with no
    /// extractable text is rejected with no row and no blob written. The
    /// thumbnail is best-effort.
    pub async fn upload_document(
        &self,
        bytes: &[u8],
        format: &str,
        filename: &str,
    ) -> Result<Memory> {
        if !validate_document_format(format) {
            return Err(Error::Validation(
                "Unsupported document format. Supported: pdf".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(Error::Validation("Empty document file".to_string()));
        }
        if bytes.len() > MAX_DOCUMENT_SIZE {
            return Err(Error::Validation(format!(
                "File too large. Maximum size is {} MB",
                MAX_DOCUMENT_SIZE / (1024 * 1024)
            )));
        }

        let (text, page_count) = extract_pdf_text(bytes)?;

        let thumbnail_path = match self
            .documents
            .generate_pdf_thumbnail(bytes, THUMBNAIL_MAX_SIZE)
        {
            Ok(jpeg) => Some(self.vault.save(BlobDomain::Thumbnail, &jpeg, "jpg").await?),
            Err(e) => {
                warn!("Thumbnail generation failed for {filename}: {e}");
                None
            }
        };

        let document_path = self.vault.save(BlobDomain::Document, bytes, format).await?;
        let memory = self
            .store
            .create_memory(NewMemory {
                memory_type: Some(MemoryType::Document),
                title: Some(stem_of(filename).to_string()),
                content: Some(text),
                document_path: Some(document_path),
                document_format: Some(format.to_lowercase()),
                document_page_count: Some(page_count as i64),
                thumbnail_path,
                ..NewMemory::default()
            })
            .await?;

        self.emit_created(&memory);
        self.enricher.schedule(memory.id, MemoryType::Document);
        info!("Created document memory {} from {filename}", memory.id);
        Ok(memory)
    }

    /// Re-enqueue transcription unless one is already running.
    pub async fn retry_transcription(&self, memory_id: i64) -> Result<()> {
        let memory = self
            .store
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::not_found("memory", memory_id))?;
        if !memory.memory_type().has_audio() {
            return Err(Error::Validation(
                "Memory has no audio to transcribe".to_string(),
            ));
        }

        if !self.store.begin_transcription_retry(memory_id).await? {
            return Err(Error::Conflict(
                "Transcription already in progress".to_string(),
            ));
        }
        self.enricher.schedule(memory_id, memory.memory_type());
        Ok(())
    }

    /// Decrypted media bytes for streaming endpoints.
    pub async fn audio_bytes(&self, memory_id: i64) -> Result<Vec<u8>> {
        let memory = self
            .store
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::not_found("memory", memory_id))?;
        let path = memory
            .kind
            .audio()
            .and_then(|a| a.audio_path.clone())
            .ok_or_else(|| Error::not_found("Audio file for memory", memory_id))?;
        self.vault.read(BlobDomain::Audio, &path).await
    }

    pub async fn video_bytes(&self, memory_id: i64) -> Result<Vec<u8>> {
        let memory = self.require_video(memory_id).await?;
        let path = memory
            .kind
            .video()
            .and_then(|v| v.video_path.clone())
            .ok_or_else(|| Error::not_found("Video file for memory", memory_id))?;
        self.vault.read(BlobDomain::Video, &path).await
    }

    pub async fn thumbnail_bytes(&self, memory_id: i64) -> Result<Vec<u8>> {
        let memory = self
            .store
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::not_found("memory", memory_id))?;
        let path = memory
            .kind
            .video()
            .and_then(|v| v.thumbnail_path.clone())
            .or_else(|| {
                memory
                    .kind
                    .document()
                    .and_then(|d| d.thumbnail_path.clone())
            })
            .ok_or_else(|| Error::not_found("Thumbnail for memory", memory_id))?;
        self.vault.read(BlobDomain::Thumbnail, &path).await
    }

    pub async fn document_bytes(&self, memory_id: i64) -> Result<Vec<u8>> {
        let memory = self
            .store
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::not_found("memory", memory_id))?;
        let path = memory
            .kind
            .document()
            .and_then(|d| d.document_path.clone())
            .ok_or_else(|| Error::not_found("Document file for memory", memory_id))?;
        self.vault.read(BlobDomain::Document, &path).await
    }

    /// Delete a memory and its blobs, emitting `MEMORY_DELETED`.
    pub async fn delete_memory(&self, memory_id: i64) -> Result<bool> {
        let Some(memory) = self.store.get_memory(memory_id).await? else {
            return Ok(false);
        };

        if let Some(audio) = memory.kind.audio() {
            if let Some(path) = &audio.audio_path {
                let _ = self.vault.delete(BlobDomain::Audio, path).await;
            }
        }
        if let Some(video) = memory.kind.video() {
            if let Some(path) = &video.video_path {
                let _ = self.vault.delete(BlobDomain::Video, path).await;
            }
            if let Some(path) = &video.thumbnail_path {
                let _ = self.vault.delete(BlobDomain::Thumbnail, path).await;
            }
        }
        if let Some(doc) = memory.kind.document() {
            if let Some(path) = &doc.document_path {
                let _ = self.vault.delete(BlobDomain::Document, path).await;
            }
            if let Some(path) = &doc.thumbnail_path {
                let _ = self.vault.delete(BlobDomain::Thumbnail, path).await;
            }
        }

        let deleted = self.store.delete_memory(memory_id).await?;
        if deleted {
            self.events
                .publish(HubEvent::new(EventKind::MemoryDeleted, memory_id, None));
        }
        Ok(deleted)
    }
}

fn stem_of(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_stem_extraction() {
        assert_eq!(stem_of("talk.mp4"), "talk");
        assert_eq!(stem_of("archive.tar.gz"), "archive.tar");
        assert_eq!(stem_of("noext"), "noext");
        assert_eq!(stem_of(".hidden"), ".hidden");
    }

    #[test]
    fn audio_validation_rejects_bad_input() {
        assert!(IngestService::validate_audio(&[], "mp3").is_err());
        assert!(IngestService::validate_audio(b"x", "exe").is_err());
        assert!(IngestService::validate_audio(b"x", "MP3").is_ok());
    }

    #[test]
    fn embedding_text_concatenates_title_and_content() {
        assert_eq!(format_for_embedding(Some("T"), Some("C")), "T\nC");
        assert_eq!(format_for_embedding(None, Some("C")), "\nC");
    }
}
