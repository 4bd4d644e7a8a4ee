//! Asynchronous AI enrichment pipeline.
//!
//! A worker is scheduled per memory at ingest. Workers are idempotent with
//! respect to already-computed fields, issue their LLM requests in parallel,
//! persist outcomes in a fixed order (title, summary, embedding summary,
//! embedding, tags), and emit `MEMORY_UPDATED` on every terminal state.
//! Workers never re-raise: the ingest path has already returned.

pub mod generators;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::events::{EventBus, EventKind, HubEvent};
use crate::llm::LlmGateway;
use crate::storage::MemoryStore;
use crate::transcription::TranscriptionEngine;
use crate::types::{Memory, MemoryType, TagSource, TranscriptionStatus};
use crate::Result;

/// Enrichment worker pool entry point. Cheap to clone; spawn methods run the
/// pipeline on the runtime and log failures instead of propagating them.
#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn MemoryStore>,
    gateway: LlmGateway,
    events: EventBus,
    transcriber: Arc<TranscriptionEngine>,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        gateway: LlmGateway,
        events: EventBus,
        transcriber: Arc<TranscriptionEngine>,
    ) -> Self {
        Enricher {
            store,
            gateway,
            events,
            transcriber,
        }
    }

    /// Schedule the right worker for a memory type.
    pub fn schedule(&self, memory_id: i64, memory_type: MemoryType) {
        let worker = self.clone();
        tokio::spawn(async move {
            match memory_type {
                MemoryType::Web | MemoryType::Note => worker.process_memory(memory_id).await,
                MemoryType::VoiceMemo | MemoryType::Audio | MemoryType::Video => {
                    worker.process_voice_memory(memory_id).await;
                }
                MemoryType::Document => worker.process_document_memory(memory_id).await,
            }
        });
    }

    /// Schedule conversation title generation from the first user message.
    pub fn schedule_conversation_title(&self, conversation_id: i64, message: String) {
        let worker = self.clone();
        tokio::spawn(async move {
            worker
                .process_conversation_title(conversation_id, &message)
                .await;
        });
    }

    async fn existing_tag_names(&self) -> Vec<String> {
        match self.store.all_tags().await {
            Ok(tags) => tags.into_iter().map(|t| t.name).collect(),
            Err(e) => {
                warn!("Could not load tag vocabulary: {e}");
                Vec::new()
            }
        }
    }

    /// Persist generated fields in deterministic order and re-embed from the
    /// embedding summary. Returns whether anything changed.
    async fn apply_generated(
        &self,
        memory_id: i64,
        title: Option<String>,
        summary: String,
        embedding_summary: String,
        tags: Vec<String>,
    ) -> bool {
        let mut updated = false;

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            if self
                .store
                .update_memory_title(memory_id, &title)
                .await
                .unwrap_or(false)
            {
                info!("Updated memory {memory_id} title: '{title}'");
                updated = true;
            }
        }

        if !summary.is_empty() {
            if self
                .store
                .update_memory_summary(memory_id, &summary)
                .await
                .unwrap_or(false)
            {
                updated = true;
            }
        }

        if !embedding_summary.trim().is_empty() {
            if self
                .store
                .update_memory_embedding_summary(memory_id, &embedding_summary)
                .await
                .unwrap_or(false)
            {
                updated = true;
            }

            match self.gateway.embed(&embedding_summary).await {
                Ok(embedding) => {
                    let model = self.gateway.current_embedding_model();
                    if let Err(e) = self
                        .store
                        .update_memory_embedding(memory_id, &embedding, &model)
                        .await
                    {
                        error!("Failed to store embedding for memory {memory_id}: {e}");
                    } else {
                        info!("Re-embedded memory {memory_id} with embedding summary");
                    }
                }
                Err(e) => error!("Failed to re-embed memory {memory_id}: {e}"),
            }
        }

        if !tags.is_empty() {
            match self
                .store
                .add_tags_to_memory(memory_id, &tags, TagSource::Ai)
                .await
            {
                Ok(added) => {
                    info!("Added {} AI tags to memory {memory_id}", added.len());
                    updated = true;
                }
                Err(e) => error!("Failed to add tags to memory {memory_id}: {e}"),
            }
        }

        updated
    }

    async fn emit_updated_snapshot(&self, memory_id: i64) {
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

    fn emit_status(&self, memory_id: i64, status: TranscriptionStatus) {
        self.events.publish(HubEvent::new(
            EventKind::MemoryUpdated,
            memory_id,
            Some(serde_json::json!({ "transcription_status": status.as_str() })),
        ));
    }

    /// Web/note worker: summary, embedding summary, tags, and a rewritten
    /// title when the pre-AI title was captured.
    pub async fn process_memory(&self, memory_id: i64) {
        let memory = match self.store.get_memory(memory_id).await {
            Ok(Some(memory)) => memory,
            Ok(None) => {
                error!("Memory {memory_id} not found for processing");
                return;
            }
            Err(e) => {
                error!("Failed to load memory {memory_id}: {e}");
                return;
            }
        };

        let Some(content) = memory.content.clone().filter(|c| !c.is_empty()) else {
            info!("Memory {memory_id} has no content, skipping AI processing");
            return;
        };
        let title = memory.title.clone().unwrap_or_default();
        let original_title = memory.original_title.clone().unwrap_or_default();
        let existing_tags = self.existing_tag_names().await;

        let (summary, embedding_summary, tags, new_title) = tokio::join!(
            generators::generate_summary(&self.gateway, &content, &title),
            generators::generate_embedding_summary(&self.gateway, &content, &title),
            generators::generate_tags(&self.gateway, &content, &title, &existing_tags),
            async {
                if original_title.is_empty() {
                    None
                } else {
                    Some(generators::generate_title(&self.gateway, &content, &original_title).await)
                }
            }
        );

        let updated = self
            .apply_generated(memory_id, new_title, summary, embedding_summary, tags)
            .await;

        if updated {
            self.emit_updated_snapshot(memory_id).await;
        }
    }

    /// Voice/audio worker: transcription first, then the text pipeline over
    /// the transcript.
    pub async fn process_voice_memory(&self, memory_id: i64) {
        if let Err(e) = self.run_voice_pipeline(memory_id).await {
            error!("Failed to process voice memory {memory_id}: {e}");
            if self
                .store
                .set_transcription_status(memory_id, TranscriptionStatus::Failed)
                .await
                .is_ok()
            {
                self.emit_status(memory_id, TranscriptionStatus::Failed);
            }
        }
    }

    async fn run_voice_pipeline(&self, memory_id: i64) -> Result<()> {
        let memory = self
            .store
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| crate::Error::not_found("memory", memory_id))?;

        if !memory.memory_type().has_audio() {
            error!(
                "Memory {memory_id} is not a media memory (type={})",
                memory.memory_type()
            );
            return Ok(());
        }

        let audio_path = audio_path_of(&memory);
        let Some(audio_path) = audio_path else {
            error!("Voice memory {memory_id} has no audio path");
            self.store
                .set_transcription_status(memory_id, TranscriptionStatus::Failed)
                .await?;
            self.emit_status(memory_id, TranscriptionStatus::Failed);
            return Ok(());
        };

        self.store
            .set_transcription_status(memory_id, TranscriptionStatus::Processing)
            .await?;
        self.emit_status(memory_id, TranscriptionStatus::Processing);

        info!("Starting transcription for voice memory {memory_id}");
        let (transcript, segments) = self.transcriber.transcribe(&audio_path).await?;

        if transcript.trim().is_empty() {
            warn!("Transcription produced no text for memory {memory_id}");
            self.store
                .set_transcription_status(memory_id, TranscriptionStatus::Failed)
                .await?;
            self.emit_status(memory_id, TranscriptionStatus::Failed);
            return Ok(());
        }

        self.store
            .update_transcript(memory_id, &transcript, &segments)
            .await?;
        info!(
            "Stored transcript for voice memory {memory_id}: {} chars, {} segments",
            transcript.len(),
            segments.len()
        );

        let existing_tags = self.existing_tag_names().await;
        let (title, summary, embedding_summary, tags) = tokio::join!(
            generators::generate_voice_title(&self.gateway, &transcript),
            generators::generate_summary(&self.gateway, &transcript, ""),
            generators::generate_embedding_summary(&self.gateway, &transcript, ""),
            generators::generate_tags(&self.gateway, &transcript, "", &existing_tags)
        );

        self.apply_generated(
            memory_id,
            Some(title),
            summary,
            embedding_summary,
            tags,
        )
        .await;

        self.store
            .set_transcription_status(memory_id, TranscriptionStatus::Completed)
            .await?;
        self.emit_updated_snapshot(memory_id).await;
        Ok(())
    }

    /// Document worker: text was extracted at upload, so only the text
    /// pipeline runs here.
    pub async fn process_document_memory(&self, memory_id: i64) {
        let memory = match self.store.get_memory(memory_id).await {
            Ok(Some(memory)) => memory,
            Ok(None) => {
                error!("Document memory {memory_id} not found for processing");
                return;
            }
            Err(e) => {
                error!("Failed to load document memory {memory_id}: {e}");
                return;
            }
        };

        if memory.memory_type() != MemoryType::Document {
            error!(
                "Memory {memory_id} is not a document memory (type={})",
                memory.memory_type()
            );
            return;
        }

        let Some(content) = memory.content.clone().filter(|c| !c.is_empty()) else {
            warn!("Document memory {memory_id} has no content, skipping AI processing");
            return;
        };
        let original_title = memory.title.clone().unwrap_or_default();
        let existing_tags = self.existing_tag_names().await;

        let (title, summary, embedding_summary, tags) = tokio::join!(
            generators::generate_document_title(&self.gateway, &content, &original_title),
            generators::generate_summary(&self.gateway, &content, &original_title),
            generators::generate_embedding_summary(&self.gateway, &content, &original_title),
            generators::generate_tags(&self.gateway, &content, &original_title, &existing_tags)
        );

        self.apply_generated(memory_id, Some(title), summary, embedding_summary, tags)
            .await;
        self.emit_updated_snapshot(memory_id).await;
    }

    /// Conversation-title worker: one LLM call from the first user message.
    pub async fn process_conversation_title(&self, conversation_id: i64, message: &str) {
        let title = generators::generate_conversation_title(&self.gateway, message).await;
        if title.is_empty() {
            return;
        }

        match self
            .store
            .update_conversation_title(conversation_id, &title)
            .await
        {
            Ok(true) => {
                info!("Updated conversation {conversation_id} title: '{title}'");
                self.events.publish(HubEvent::new(
                    EventKind::ConversationUpdated,
                    conversation_id,
                    Some(serde_json::json!({ "title": title })),
                ));
            }
            Ok(false) => warn!("Conversation {conversation_id} vanished before titling"),
            Err(e) => error!("Failed to update conversation title: {e}"),
        }
    }
}

fn audio_path_of(memory: &Memory) -> Option<String> {
    memory
        .kind
        .audio()
        .and_then(|audio| audio.audio_path.clone())
}
