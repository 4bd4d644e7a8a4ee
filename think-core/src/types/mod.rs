//! Common types shared across the engine.

mod conversation;
mod enums;
mod graph;
mod job;
mod memory;
mod search;

pub use conversation::{
    ChatTurn, Conversation, ConversationDetail, ConversationSummary, Message, RetrievedSource,
    SourceRef, TokenUsage,
};
pub use enums::{
    DateFilter, LinkType, MediaSource, MemoryType, Role, TagSource, TranscriptionStatus,
    VideoProcessingStatus,
};
pub use graph::{
    BatchLinkOutcome, GraphData, GraphEdge, GraphFilter, GraphNode, LinkTimelineEntry, LinkedMemory,
    MemoryLink,
};
pub use job::{Job, JobStatus, JobUpdate, JOB_TYPE_REEMBED};
pub use memory::{
    deserialize_embedding, serialize_embedding, AudioDetails, DocumentDetails, Memory, MemoryKind,
    MemoryQuery, MemorySummary, NewMemory, ProcessingCounts, ReembedCandidate, TagInfo, TagUsage,
    TranscriptSegment, VideoDetails,
};
pub use search::{MatchType, SearchHit, RRF_K};
