//! `MemoryStore` implementation delegating to the inherent CRUD methods.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use think_core::storage::MemoryStore;
use think_core::types::{
    BatchLinkOutcome, Conversation, ConversationDetail, ConversationSummary, GraphData,
    GraphFilter, Job, JobUpdate, LinkTimelineEntry, LinkType, LinkedMemory, Memory, MemoryLink,
    MemoryQuery, MemorySummary, Message, NewMemory, ProcessingCounts, ReembedCandidate,
    RetrievedSource, Role, SearchHit, TagInfo, TagSource, TagUsage, TokenUsage,
    TranscriptSegment, TranscriptionStatus, VideoProcessingStatus,
};
use think_core::Result;

use crate::LibsqlStore;

#[async_trait]
impl MemoryStore for LibsqlStore {
    async fn create_memory(&self, new: NewMemory) -> Result<Memory> {
        LibsqlStore::create_memory(self, new).await
    }

    async fn get_memory(&self, id: i64) -> Result<Option<Memory>> {
        LibsqlStore::get_memory(self, id).await
    }

    async fn get_memory_by_url(&self, url: &str) -> Result<Option<Memory>> {
        LibsqlStore::get_memory_by_url(self, url).await
    }

    async fn list_memories(&self, query: MemoryQuery) -> Result<(Vec<MemorySummary>, u64)> {
        LibsqlStore::list_memories(self, query).await
    }

    async fn update_memory(
        &self,
        id: i64,
        title: &str,
        content: &str,
        embedding: Option<(&[f32], &str)>,
    ) -> Result<Option<Memory>> {
        LibsqlStore::update_memory(self, id, title, content, embedding).await
    }

    async fn delete_memory(&self, id: i64) -> Result<bool> {
        LibsqlStore::delete_memory(self, id).await
    }

    async fn update_memory_embedding(
        &self,
        id: i64,
        embedding: &[f32],
        model: &str,
    ) -> Result<bool> {
        LibsqlStore::update_memory_embedding(self, id, embedding, model).await
    }

    async fn update_memory_summary(&self, id: i64, summary: &str) -> Result<bool> {
        LibsqlStore::update_memory_summary(self, id, summary).await
    }

    async fn update_memory_embedding_summary(
        &self,
        id: i64,
        embedding_summary: &str,
    ) -> Result<bool> {
        LibsqlStore::update_memory_embedding_summary(self, id, embedding_summary).await
    }

    async fn update_memory_title(&self, id: i64, title: &str) -> Result<bool> {
        LibsqlStore::update_memory_title(self, id, title).await
    }

    async fn increment_processing_attempts(&self, id: i64) -> Result<bool> {
        LibsqlStore::increment_processing_attempts(self, id).await
    }

    async fn count_memories_needing_processing(
        &self,
        current_model: &str,
    ) -> Result<ProcessingCounts> {
        LibsqlStore::count_memories_needing_processing(self, current_model).await
    }

    async fn memories_without_embedding_summary(
        &self,
        limit: usize,
    ) -> Result<Vec<ReembedCandidate>> {
        LibsqlStore::memories_without_embedding_summary(self, limit).await
    }

    async fn memories_needing_reembedding(
        &self,
        current_model: &str,
        limit: usize,
    ) -> Result<Vec<ReembedCandidate>> {
        LibsqlStore::memories_needing_reembedding(self, current_model, limit).await
    }

    async fn memories_without_embeddings(&self) -> Result<Vec<ReembedCandidate>> {
        LibsqlStore::memories_without_embeddings(self).await
    }

    async fn count_memories_with_embeddings(&self) -> Result<u64> {
        LibsqlStore::count_memories_with_embeddings(self).await
    }

    async fn update_transcript(
        &self,
        id: i64,
        transcript: &str,
        segments: &[TranscriptSegment],
    ) -> Result<bool> {
        LibsqlStore::update_transcript(self, id, transcript, segments).await
    }

    async fn set_transcription_status(
        &self,
        id: i64,
        status: TranscriptionStatus,
    ) -> Result<bool> {
        LibsqlStore::set_transcription_status(self, id, status).await
    }

    async fn begin_transcription_retry(&self, id: i64) -> Result<bool> {
        LibsqlStore::begin_transcription_retry(self, id).await
    }

    async fn attach_video_audio(
        &self,
        id: i64,
        audio_path: &str,
        audio_format: &str,
    ) -> Result<bool> {
        LibsqlStore::attach_video_audio(self, id, audio_path, audio_format).await
    }

    async fn set_video_processing_status(
        &self,
        id: i64,
        status: VideoProcessingStatus,
    ) -> Result<bool> {
        LibsqlStore::set_video_processing_status(self, id, status).await
    }

    async fn set_thumbnail_path(&self, id: i64, thumbnail_path: &str) -> Result<bool> {
        LibsqlStore::set_thumbnail_path(self, id, thumbnail_path).await
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        limit: usize,
        keyword_query: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        LibsqlStore::search_similar(self, query_embedding, limit, keyword_query).await
    }

    async fn all_tags(&self) -> Result<Vec<TagUsage>> {
        LibsqlStore::all_tags(self).await
    }

    async fn get_or_create_tag(&self, name: &str) -> Result<TagInfo> {
        LibsqlStore::get_or_create_tag(self, name).await
    }

    async fn add_tags_to_memory(
        &self,
        memory_id: i64,
        names: &[String],
        source: TagSource,
    ) -> Result<Vec<TagInfo>> {
        LibsqlStore::add_tags_to_memory(self, memory_id, names, source).await
    }

    async fn remove_tag_from_memory(&self, memory_id: i64, tag_id: i64) -> Result<bool> {
        LibsqlStore::remove_tag_from_memory(self, memory_id, tag_id).await
    }

    async fn memory_tags(&self, memory_id: i64) -> Result<Vec<TagInfo>> {
        LibsqlStore::memory_tags(self, memory_id).await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        LibsqlStore::create_conversation(self, title).await
    }

    async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        LibsqlStore::list_conversations(self, limit, offset).await
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<ConversationDetail>> {
        LibsqlStore::get_conversation(self, id).await
    }

    async fn delete_conversation(&self, id: i64) -> Result<bool> {
        LibsqlStore::delete_conversation(self, id).await
    }

    async fn update_conversation_title(&self, id: i64, title: &str) -> Result<bool> {
        LibsqlStore::update_conversation_title(self, id, title).await
    }

    async fn set_conversation_pinned(&self, id: i64, pinned: bool) -> Result<bool> {
        LibsqlStore::set_conversation_pinned(self, id, pinned).await
    }

    async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        sources: &[RetrievedSource],
        usage: Option<TokenUsage>,
    ) -> Result<Option<Message>> {
        LibsqlStore::add_message(self, conversation_id, role, content, sources, usage).await
    }

    async fn create_link(
        &self,
        source_id: i64,
        target_id: i64,
        link_type: LinkType,
        relevance_score: Option<f64>,
    ) -> Result<MemoryLink> {
        LibsqlStore::create_link(self, source_id, target_id, link_type, relevance_score).await
    }

    async fn delete_link(&self, source_id: i64, target_id: i64) -> Result<()> {
        LibsqlStore::delete_link(self, source_id, target_id).await
    }

    async fn memory_links(&self, memory_id: i64) -> Result<Vec<LinkedMemory>> {
        LibsqlStore::memory_links(self, memory_id).await
    }

    async fn linked_memory_ids(&self, memory_id: i64) -> Result<Vec<i64>> {
        LibsqlStore::linked_memory_ids(self, memory_id).await
    }

    async fn batch_create_links(&self, pairs: &[(i64, i64, f64)]) -> Result<BatchLinkOutcome> {
        LibsqlStore::batch_create_links(self, pairs).await
    }

    async fn graph_data(&self, filter: &GraphFilter) -> Result<GraphData> {
        LibsqlStore::graph_data(self, filter).await
    }

    async fn embeddings_for_nodes(&self, node_ids: &[i64]) -> Result<HashMap<i64, Vec<f32>>> {
        LibsqlStore::embeddings_for_nodes(self, node_ids).await
    }

    async fn link_creation_timeline(&self, days: u32) -> Result<Vec<LinkTimelineEntry>> {
        LibsqlStore::link_creation_timeline(self, days).await
    }

    async fn create_job(&self, job_type: &str, params: Option<serde_json::Value>) -> Result<Job> {
        LibsqlStore::create_job(self, job_type, params).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        LibsqlStore::get_job(self, id).await
    }

    async fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<bool> {
        LibsqlStore::update_job(self, id, update).await
    }

    async fn active_job(&self, job_type: &str) -> Result<Option<Job>> {
        LibsqlStore::active_job(self, job_type).await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        LibsqlStore::get_setting(self, key).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        LibsqlStore::set_setting(self, key, value).await
    }

    async fn delete_setting(&self, key: &str) -> Result<()> {
        LibsqlStore::delete_setting(self, key).await
    }

    async fn all_settings(&self) -> Result<HashMap<String, String>> {
        LibsqlStore::all_settings(self).await
    }
}
