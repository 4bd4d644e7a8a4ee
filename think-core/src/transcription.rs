//! Local speech-to-text over encrypted audio blobs.
//!
//! The concrete Whisper binding lives behind the [`SpeechModel`] seam; this
//! module owns the orchestration: resolve the configured model, decrypt the
//! blob, stage it in a tempfile with the original extension, run the
//! blocking model call off the async runtime, and always clean the tempfile
//! up afterwards.

use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::{BlobDomain, BlobStore, MemoryStore};
use crate::types::TranscriptSegment;

/// Supported model names, smallest to largest.
pub const SPEECH_MODELS: &[&str] = &["tiny", "base", "small", "medium"];

/// Model used when the setting is absent or invalid.
pub const DEFAULT_SPEECH_MODEL: &str = "base";

/// Settings key selecting the speech model.
pub const SPEECH_MODEL_SETTING: &str = "whisper_model";

/// Decoding options handed to the model backend.
#[derive(Debug, Clone, Copy)]
pub struct TranscribeOptions {
    pub beam_size: u32,
    /// `None` auto-detects the language
    pub language: Option<&'static str>,
    /// Filter non-speech spans before decoding
    pub vad_filter: bool,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        TranscribeOptions {
            beam_size: 5,
            language: None,
            vad_filter: true,
        }
    }
}

/// A loaded speech-to-text model. Calls are blocking and run on a worker
/// thread.
pub trait SpeechModel: Send + Sync {
    fn transcribe(
        &self,
        audio_file: &Path,
        options: TranscribeOptions,
    ) -> Result<(String, Vec<TranscriptSegment>)>;
}

/// Loads models by name. Implementations are external collaborators (the
/// bundled Whisper runtime in the desktop build, a mock in tests).
pub trait SpeechModelLoader: Send + Sync {
    fn load(&self, model_name: &str) -> Result<Arc<dyn SpeechModel>>;
}

/// Transcription engine with a process-wide cached model instance.
pub struct TranscriptionEngine {
    loader: Arc<dyn SpeechModelLoader>,
    vault: Arc<dyn BlobStore>,
    store: Arc<dyn MemoryStore>,
    cached: Mutex<Option<(String, Arc<dyn SpeechModel>)>>,
}

impl TranscriptionEngine {
    pub fn new(
        loader: Arc<dyn SpeechModelLoader>,
        vault: Arc<dyn BlobStore>,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        TranscriptionEngine {
            loader,
            vault,
            store,
            cached: Mutex::new(None),
        }
    }

    /// Configured model name, constrained to the supported set.
    async fn model_name(&self) -> String {
        match self.store.get_setting(SPEECH_MODEL_SETTING).await {
            Ok(Some(name)) if SPEECH_MODELS.contains(&name.as_str()) => name,
            _ => DEFAULT_SPEECH_MODEL.to_string(),
        }
    }

    fn model_for(&self, name: &str) -> Result<Arc<dyn SpeechModel>> {
        let mut cached = self.cached.lock();
        if let Some((cached_name, model)) = cached.as_ref() {
            if cached_name == name {
                return Ok(model.clone());
            }
        }
        info!("Loading speech model: {name}");
        let model = self
            .loader
            .load(name)
            .map_err(|e| Error::ModelUnavailable(format!("Speech model '{name}': {e}")))?;
        *cached = Some((name.to_string(), model.clone()));
        Ok(model)
    }

    /// Drop the cached model to free memory.
    pub fn unload(&self) {
        *self.cached.lock() = None;
        info!("Speech model unloaded");
    }

    /// Transcribe an encrypted audio blob by relative path.
    ///
    /// Returns the full transcript and timed segments, timestamps rounded to
    /// two decimals.
    pub async fn transcribe(
        &self,
        audio_path: &str,
    ) -> Result<(String, Vec<TranscriptSegment>)> {
        let model_name = self.model_name().await;
        let model = self.model_for(&model_name)?;

        let audio_data = self.vault.read(BlobDomain::Audio, audio_path).await?;
        let audio_format = extension_of(audio_path);

        let (transcript, segments) = tokio::task::spawn_blocking(move || {
            transcribe_blocking(model.as_ref(), &audio_data, &audio_format)
        })
        .await
        .map_err(|e| Error::Storage(format!("Transcription task failed: {e}")))??;

        let segments = segments
            .into_iter()
            .map(|s| TranscriptSegment {
                start: round2(s.start),
                end: round2(s.end),
                text: s.text.trim().to_string(),
            })
            .collect::<Vec<_>>();

        info!(
            "Transcription complete: {} chars, {} segments",
            transcript.len(),
            segments.len()
        );
        Ok((transcript, segments))
    }
}

/// Stage decrypted audio in a tempfile and run the model. The tempfile is
/// removed when the guard drops, error paths included.
fn transcribe_blocking(
    model: &dyn SpeechModel,
    audio_data: &[u8],
    audio_format: &str,
) -> Result<(String, Vec<TranscriptSegment>)> {
    let mut temp = tempfile::Builder::new()
        .suffix(&format!(".{audio_format}"))
        .tempfile()?;
    temp.write_all(audio_data)?;
    temp.flush()?;

    model.transcribe(temp.path(), TranscribeOptions::default())
}

/// Extract the media extension from `<uuid>.<ext>.enc`.
fn extension_of(audio_path: &str) -> String {
    let parts: Vec<&str> = audio_path.split('.').collect();
    if parts.len() >= 3 {
        parts[parts.len() - 2].to_string()
    } else {
        warn!("Audio path without recognizable extension: {audio_path}");
        "wav".to_string()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_taken_before_enc_suffix() {
        assert_eq!(extension_of("abc123.mp3.enc"), "mp3");
        assert_eq!(extension_of("abc123.webm.enc"), "webm");
        assert_eq!(extension_of("noext"), "wav");
    }

    #[test]
    fn timestamps_round_to_two_decimals() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(2.0), 2.0);
        assert_eq!(round2(0.005), 0.01);
    }

    #[test]
    fn default_options_match_decoder_settings() {
        let options = TranscribeOptions::default();
        assert_eq!(options.beam_size, 5);
        assert!(options.vad_filter);
        assert!(options.language.is_none());
    }
}
