//! Media-specific field updates for voice, audio, and video memories.

use think_core::types::{TranscriptSegment, TranscriptionStatus, VideoProcessingStatus};
use think_core::{Error, Result};
use tracing::debug;

use super::storage_err;
use crate::LibsqlStore;

impl LibsqlStore {
    /// Persist transcript and segments. The transcript doubles as the
    /// memory's `content` so it flows through search and enrichment, and a
    /// missing `audio_duration` is backfilled from the last segment's end.
    pub async fn update_transcript(
        &self,
        id: i64,
        transcript: &str,
        segments: &[TranscriptSegment],
    ) -> Result<bool> {
        let segments_json = serde_json::to_string(segments).map_err(Error::Serialization)?;
        let last_end = segments.last().map(|s| s.end);

        let conn = self.writer().await;
        let changed = conn
            .execute(
                r#"
                UPDATE memories SET
                    transcript = ?,
                    transcript_segments = ?,
                    content = ?,
                    audio_duration = COALESCE(audio_duration, ?)
                WHERE id = ?
                "#,
                libsql::params![transcript, segments_json, transcript, last_end, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn set_transcription_status(
        &self,
        id: i64,
        status: TranscriptionStatus,
    ) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE memories SET transcription_status = ? WHERE id = ?",
                libsql::params![status.as_str(), id],
            )
            .await
            .map_err(storage_err)?;
        debug!("Memory {id} transcription status -> {}", status.as_str());
        Ok(changed > 0)
    }

    /// Atomic retry gate: flip to `pending` unless a transcription is
    /// already running. Zero changed rows means the retry must be rejected.
    pub async fn begin_transcription_retry(&self, id: i64) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                r#"
                UPDATE memories SET transcription_status = 'pending'
                WHERE id = ? AND (transcription_status IS NULL OR transcription_status != 'processing')
                "#,
                libsql::params![id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Attach client-extracted audio to a video memory: extraction is done,
    /// transcription is pending.
    pub async fn attach_video_audio(
        &self,
        id: i64,
        audio_path: &str,
        audio_format: &str,
    ) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                r#"
                UPDATE memories SET
                    audio_path = ?,
                    audio_format = ?,
                    transcription_status = 'pending',
                    video_processing_status = 'ready'
                WHERE id = ? AND type = 'video'
                "#,
                libsql::params![audio_path, audio_format, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn set_video_processing_status(
        &self,
        id: i64,
        status: VideoProcessingStatus,
    ) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE memories SET video_processing_status = ? WHERE id = ? AND type = 'video'",
                libsql::params![status.as_str(), id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    pub async fn set_thumbnail_path(&self, id: i64, thumbnail_path: &str) -> Result<bool> {
        let conn = self.writer().await;
        let changed = conn
            .execute(
                "UPDATE memories SET thumbnail_path = ? WHERE id = ?",
                libsql::params![thumbnail_path, id],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }
}
