//! # Storage Abstraction
//!
//! Unified traits for the persistence layer. The engine is written against
//! these seams so the encrypted libSQL backend (and any future backend) can
//! be swapped transparently, and so workers and services can be tested with
//! in-memory fakes.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::{
    BatchLinkOutcome, Conversation, ConversationDetail, ConversationSummary, GraphData,
    GraphFilter, Job, JobUpdate, LinkTimelineEntry, LinkType, LinkedMemory, Memory, MemoryLink,
    MemoryQuery, MemorySummary, Message, NewMemory, ProcessingCounts, ReembedCandidate,
    RetrievedSource, Role, SearchHit, TagInfo, TagSource, TagUsage, TokenUsage,
    TranscriptSegment, TranscriptionStatus, VideoProcessingStatus,
};
use crate::Result;

/// Typed data access over the encrypted relational store.
///
/// All operations are async; implementations funnel writes through a
/// single-writer executor so concurrent CRUD never contends on the database
/// file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    // --- Memories ---

    /// Create a memory; the returned entity carries the assigned id.
    async fn create_memory(&self, new: NewMemory) -> Result<Memory>;

    /// Fetch a memory with type-specific field expansion and tags.
    async fn get_memory(&self, id: i64) -> Result<Option<Memory>>;

    /// Most recently created memory with the given URL.
    async fn get_memory_by_url(&self, url: &str) -> Result<Option<Memory>>;

    /// Paginated listing with type/date/tag filters; returns `(items, total)`.
    async fn list_memories(&self, query: MemoryQuery) -> Result<(Vec<MemorySummary>, u64)>;

    /// Update title/content, optionally replacing the embedding.
    async fn update_memory(
        &self,
        id: i64,
        title: &str,
        content: &str,
        embedding: Option<(&[f32], &str)>,
    ) -> Result<Option<Memory>>;

    /// Delete a memory row; blob cleanup is the caller's job.
    async fn delete_memory(&self, id: i64) -> Result<bool>;

    async fn update_memory_embedding(&self, id: i64, embedding: &[f32], model: &str)
        -> Result<bool>;

    async fn update_memory_summary(&self, id: i64, summary: &str) -> Result<bool>;

    async fn update_memory_embedding_summary(&self, id: i64, embedding_summary: &str)
        -> Result<bool>;

    async fn update_memory_title(&self, id: i64, title: &str) -> Result<bool>;

    /// Bump the retry governor after a failed enrichment attempt.
    async fn increment_processing_attempts(&self, id: i64) -> Result<bool>;

    // --- Reprocessing queries ---

    /// Counts of memories a full reembed job would process right now.
    async fn count_memories_needing_processing(
        &self,
        current_model: &str,
    ) -> Result<ProcessingCounts>;

    /// Memories lacking an embedding summary, skipping those with 3+ failed
    /// attempts.
    async fn memories_without_embedding_summary(
        &self,
        limit: usize,
    ) -> Result<Vec<ReembedCandidate>>;

    /// Memories whose embedding is missing or was produced by a different
    /// model than `current_model`.
    async fn memories_needing_reembedding(
        &self,
        current_model: &str,
        limit: usize,
    ) -> Result<Vec<ReembedCandidate>>;

    async fn memories_without_embeddings(&self) -> Result<Vec<ReembedCandidate>>;

    async fn count_memories_with_embeddings(&self) -> Result<u64>;

    // --- Media field updates ---

    /// Persist transcript and segments; mirrors the transcript into
    /// `content` and backfills `audio_duration` from the last segment.
    async fn update_transcript(
        &self,
        id: i64,
        transcript: &str,
        segments: &[TranscriptSegment],
    ) -> Result<bool>;

    async fn set_transcription_status(&self, id: i64, status: TranscriptionStatus)
        -> Result<bool>;

    /// Atomically flip status to `pending` unless already `processing`.
    /// Returns false (no rows changed) when a retry must be rejected.
    async fn begin_transcription_retry(&self, id: i64) -> Result<bool>;

    async fn attach_video_audio(&self, id: i64, audio_path: &str, audio_format: &str)
        -> Result<bool>;

    async fn set_video_processing_status(
        &self,
        id: i64,
        status: VideoProcessingStatus,
    ) -> Result<bool>;

    async fn set_thumbnail_path(&self, id: i64, thumbnail_path: &str) -> Result<bool>;

    // --- Search ---

    /// Hybrid vector + keyword search fused with RRF (k = 60). Falls back to
    /// pure vector ranking when FTS is unavailable.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        limit: usize,
        keyword_query: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    // --- Tags ---

    /// All tags sorted by usage count descending.
    async fn all_tags(&self) -> Result<Vec<TagUsage>>;

    /// Lowercases and trims the name; creates the tag when missing.
    async fn get_or_create_tag(&self, name: &str) -> Result<TagInfo>;

    /// Attach tags to a memory, creating missing tags and deduping joins.
    async fn add_tags_to_memory(
        &self,
        memory_id: i64,
        names: &[String],
        source: TagSource,
    ) -> Result<Vec<TagInfo>>;

    async fn remove_tag_from_memory(&self, memory_id: i64, tag_id: i64) -> Result<bool>;

    async fn memory_tags(&self, memory_id: i64) -> Result<Vec<TagInfo>>;

    // --- Conversations ---

    async fn create_conversation(&self, title: &str) -> Result<Conversation>;

    /// Ordered by `pinned DESC, updated_at DESC` with batched last-message
    /// previews truncated to 100 chars.
    async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>>;

    async fn get_conversation(&self, id: i64) -> Result<Option<ConversationDetail>>;

    async fn delete_conversation(&self, id: i64) -> Result<bool>;

    async fn update_conversation_title(&self, id: i64, title: &str) -> Result<bool>;

    async fn set_conversation_pinned(&self, id: i64, pinned: bool) -> Result<bool>;

    /// Insert a message and its sources in one transaction, bumping the
    /// conversation's `updated_at` within the same transaction.
    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        sources: &[RetrievedSource],
        usage: Option<TokenUsage>,
    ) -> Result<Option<Message>>;

    // --- Links ---

    /// Create a bidirectional link (two rows, one transaction). Rejects
    /// self-links, missing memories, out-of-range scores, and any
    /// pre-existing row in either direction.
    async fn create_link(
        &self,
        source_id: i64,
        target_id: i64,
        link_type: LinkType,
        relevance_score: Option<f64>,
    ) -> Result<MemoryLink>;

    /// Remove both directional rows; `NotFound` when neither exists.
    async fn delete_link(&self, source_id: i64, target_id: i64) -> Result<()>;

    /// Links for a memory; bidirectional storage makes this a single scan
    /// over `source_memory_id`.
    async fn memory_links(&self, memory_id: i64) -> Result<Vec<LinkedMemory>>;

    async fn linked_memory_ids(&self, memory_id: i64) -> Result<Vec<i64>>;

    /// Transactional batch creation of auto links; aggregates failures.
    async fn batch_create_links(&self, pairs: &[(i64, i64, f64)]) -> Result<BatchLinkOutcome>;

    // --- Graph ---

    /// Materialize the filtered graph view with deduped undirected edges.
    async fn graph_data(&self, filter: &GraphFilter) -> Result<GraphData>;

    /// Bulk-fetch embeddings for graph nodes.
    async fn embeddings_for_nodes(&self, node_ids: &[i64]) -> Result<HashMap<i64, Vec<f32>>>;

    /// Daily link-creation counts over the last `days`, most recent first.
    async fn link_creation_timeline(&self, days: u32) -> Result<Vec<LinkTimelineEntry>>;

    // --- Jobs ---

    async fn create_job(&self, job_type: &str, params: Option<serde_json::Value>) -> Result<Job>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>>;

    async fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<bool>;

    /// Most recent pending/running job of the given type, if any.
    async fn active_job(&self, job_type: &str) -> Result<Option<Job>>;

    // --- Settings ---

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    async fn delete_setting(&self, key: &str) -> Result<()>;

    async fn all_settings(&self) -> Result<HashMap<String, String>>;
}

/// Blob storage domains. Thumbnails get their own directory but share the
/// video key domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobDomain {
    Audio,
    Video,
    Thumbnail,
    Document,
}

impl BlobDomain {
    /// Directory name under the data root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            BlobDomain::Audio => "audio",
            BlobDomain::Video => "video",
            BlobDomain::Thumbnail => "thumbnails",
            BlobDomain::Document => "documents",
        }
    }

    /// Key domain used to encrypt blobs in this directory.
    pub fn key_domain(&self) -> crate::crypto::KeyDomain {
        match self {
            BlobDomain::Audio => crate::crypto::KeyDomain::Audio,
            BlobDomain::Video | BlobDomain::Thumbnail => crate::crypto::KeyDomain::Video,
            BlobDomain::Document => crate::crypto::KeyDomain::Document,
        }
    }
}

/// Encrypted, append-only file store per domain.
///
/// Filenames are `<uuid>.<ext>.enc`; every read/delete resolves the path and
/// verifies it stays under the domain root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Encrypt and persist, returning the relative file name.
    async fn save(&self, domain: BlobDomain, bytes: &[u8], ext: &str) -> Result<String>;

    /// Read and decrypt a blob by relative name.
    async fn read(&self, domain: BlobDomain, name: &str) -> Result<Vec<u8>>;

    /// Delete a blob; returns false when it did not exist.
    async fn delete(&self, domain: BlobDomain, name: &str) -> Result<bool>;
}

/// Convenience API-key accessors layered over the settings table, so keys
/// are encrypted at rest with everything else.
pub mod secrets {
    use super::MemoryStore;
    use crate::Result;

    fn api_key_name(provider: &str) -> String {
        format!("api_key_{provider}")
    }

    pub async fn set_api_key(store: &dyn MemoryStore, provider: &str, key: &str) -> Result<()> {
        store.set_setting(&api_key_name(provider), key).await
    }

    pub async fn get_api_key(store: &dyn MemoryStore, provider: &str) -> Result<Option<String>> {
        store.get_setting(&api_key_name(provider)).await
    }

    pub async fn delete_api_key(store: &dyn MemoryStore, provider: &str) -> Result<()> {
        store.delete_setting(&api_key_name(provider)).await
    }
}
