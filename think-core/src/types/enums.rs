use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Classification of a stored memory.
///
/// The type drives which media columns are populated and which enrichment
/// worker runs after ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Web clip captured by the browser extension
    Web,
    /// Free-form note
    Note,
    /// In-app voice recording
    VoiceMemo,
    /// Uploaded audio file
    Audio,
    /// Uploaded video file
    Video,
    /// Uploaded document (PDF)
    Document,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Web => "web",
            MemoryType::Note => "note",
            MemoryType::VoiceMemo => "voice_memo",
            MemoryType::Audio => "audio",
            MemoryType::Video => "video",
            MemoryType::Document => "document",
        }
    }

    /// Memory types that carry an audio track and go through transcription
    pub fn has_audio(&self) -> bool {
        matches!(
            self,
            MemoryType::VoiceMemo | MemoryType::Audio | MemoryType::Video
        )
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(MemoryType::Web),
            "note" => Ok(MemoryType::Note),
            "voice_memo" => Ok(MemoryType::VoiceMemo),
            "audio" => Ok(MemoryType::Audio),
            "video" => Ok(MemoryType::Video),
            "document" => Ok(MemoryType::Document),
            other => Err(Error::Validation(format!("Unknown memory type: {other}"))),
        }
    }
}

/// Whether a tag was attached by the user or by the enrichment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSource {
    Manual,
    Ai,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::Manual => "manual",
            TagSource::Ai => "ai",
        }
    }
}

impl FromStr for TagSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TagSource::Manual),
            "ai" => Ok(TagSource::Ai),
            other => Err(Error::Validation(format!("Unknown tag source: {other}"))),
        }
    }
}

/// Whether a link was created by the user or by the auto-link engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Manual,
    Auto,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Manual => "manual",
            LinkType::Auto => "auto",
        }
    }
}

impl FromStr for LinkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(LinkType::Manual),
            "auto" => Ok(LinkType::Auto),
            other => Err(Error::Validation(format!("Unknown link type: {other}"))),
        }
    }
}

/// Transcription lifecycle for media memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptionStatus::Pending => "pending",
            TranscriptionStatus::Processing => "processing",
            TranscriptionStatus::Completed => "completed",
            TranscriptionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TranscriptionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranscriptionStatus::Pending),
            "processing" => Ok(TranscriptionStatus::Processing),
            "completed" => Ok(TranscriptionStatus::Completed),
            "failed" => Ok(TranscriptionStatus::Failed),
            other => Err(Error::Validation(format!(
                "Unknown transcription status: {other}"
            ))),
        }
    }
}

/// Video ingest lifecycle: the client extracts audio and a thumbnail after
/// the upload, so the row tracks how far extraction has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoProcessingStatus {
    PendingExtraction,
    Extracting,
    Ready,
    Failed,
}

impl VideoProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoProcessingStatus::PendingExtraction => "pending_extraction",
            VideoProcessingStatus::Extracting => "extracting",
            VideoProcessingStatus::Ready => "ready",
            VideoProcessingStatus::Failed => "failed",
        }
    }
}

impl FromStr for VideoProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_extraction" => Ok(VideoProcessingStatus::PendingExtraction),
            "extracting" => Ok(VideoProcessingStatus::Extracting),
            "ready" => Ok(VideoProcessingStatus::Ready),
            "failed" => Ok(VideoProcessingStatus::Failed),
            other => Err(Error::Validation(format!(
                "Unknown video processing status: {other}"
            ))),
        }
    }
}

/// How a media memory entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Recording,
    Upload,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::Recording => "recording",
            MediaSource::Upload => "upload",
        }
    }
}

impl FromStr for MediaSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recording" => Ok(MediaSource::Recording),
            "upload" => Ok(MediaSource::Upload),
            other => Err(Error::Validation(format!("Unknown media source: {other}"))),
        }
    }
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(Error::Validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Relative date window for listing and graph filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    Today,
    Week,
    Month,
}

impl DateFilter {
    /// UTC cutoff for the window, relative to `now`.
    pub fn cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        match self {
            DateFilter::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap_or(now),
            DateFilter::Week => now - chrono::Duration::days(7),
            DateFilter::Month => now - chrono::Duration::days(30),
        }
    }
}

impl FromStr for DateFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(DateFilter::Today),
            "week" => Ok(DateFilter::Week),
            "month" => Ok(DateFilter::Month),
            other => Err(Error::Validation(format!("Unknown date range: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trips_through_str() {
        for t in [
            MemoryType::Web,
            MemoryType::Note,
            MemoryType::VoiceMemo,
            MemoryType::Audio,
            MemoryType::Video,
            MemoryType::Document,
        ] {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
    }

    #[test]
    fn media_types_have_audio() {
        assert!(MemoryType::VoiceMemo.has_audio());
        assert!(MemoryType::Video.has_audio());
        assert!(!MemoryType::Web.has_audio());
        assert!(!MemoryType::Document.has_audio());
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert!("webpage".parse::<MemoryType>().is_err());
        assert!("".parse::<TranscriptionStatus>().is_err());
    }
}
