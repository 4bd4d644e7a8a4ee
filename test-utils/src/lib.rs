//! # Test Utilities
//!
//! Shared test fixtures for the Think engine.
//!
//! Provides:
//! - Temporary encrypted stores
//! - Deterministic mocks for the speech and page-renderer seams
//! - Pseudo-embedding generation for search tests

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use think_core::document::PageRenderer;
use think_core::transcription::{SpeechModel, SpeechModelLoader, TranscribeOptions};
use think_core::types::TranscriptSegment;
use think_core::Result;
use think_storage_libsql::{unlock, BlobVault, LibsqlStore, Unlocked};

/// A temporary unlocked store; the directory lives as long as the handle.
pub struct TempStore {
    pub dir: TempDir,
    pub store: Arc<LibsqlStore>,
    pub vault: Arc<BlobVault>,
}

/// Create a fresh encrypted store in a temp directory.
pub async fn temp_store() -> TempStore {
    temp_store_with_password("test-password").await
}

/// Create a fresh encrypted store with a chosen password.
pub async fn temp_store_with_password(password: &str) -> TempStore {
    let dir = TempDir::new().expect("temp dir");
    let Unlocked { store, vault } = think_storage_libsql::setup(dir.path(), password)
        .await
        .expect("setup store");
    TempStore { dir, store, vault }
}

/// Re-unlock an existing data directory (e.g. after dropping handles to
/// simulate a restart).
pub async fn reopen(data_dir: &Path, password: &str) -> Result<Unlocked> {
    unlock(data_dir, password).await
}

/// Speech model that returns a fixed transcript regardless of input.
pub struct MockSpeechModel {
    pub transcript: String,
    pub segments: Vec<TranscriptSegment>,
}

impl MockSpeechModel {
    pub fn saying(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let segments = words
            .chunks(4)
            .enumerate()
            .map(|(i, chunk)| TranscriptSegment {
                start: i as f64 * 2.0,
                end: i as f64 * 2.0 + 1.9,
                text: chunk.join(" "),
            })
            .collect();
        MockSpeechModel {
            transcript: text.to_string(),
            segments,
        }
    }

    /// A model that produces no speech, for failure-path tests.
    pub fn silent() -> Self {
        MockSpeechModel {
            transcript: String::new(),
            segments: Vec::new(),
        }
    }
}

impl SpeechModel for MockSpeechModel {
    fn transcribe(
        &self,
        _audio_file: &Path,
        _options: TranscribeOptions,
    ) -> Result<(String, Vec<TranscriptSegment>)> {
        Ok((self.transcript.clone(), self.segments.clone()))
    }
}

/// Loader handing out one shared mock model for every name.
pub struct MockSpeechLoader {
    model: Arc<MockSpeechModel>,
}

impl MockSpeechLoader {
    pub fn new(model: MockSpeechModel) -> Self {
        MockSpeechLoader {
            model: Arc::new(model),
        }
    }
}

impl SpeechModelLoader for MockSpeechLoader {
    fn load(&self, _model_name: &str) -> Result<Arc<dyn SpeechModel>> {
        Ok(self.model.clone())
    }
}

/// Page renderer producing a blank portrait page.
pub struct MockPageRenderer;

impl PageRenderer for MockPageRenderer {
    fn render_first_page(&self, _pdf_bytes: &[u8]) -> Result<image::DynamicImage> {
        Ok(image::DynamicImage::new_rgb8(850, 1100))
    }
}

/// Deterministic pseudo-embedding: equal inputs get equal vectors, distinct
/// inputs diverge. Good enough to exercise vector search ordering.
pub fn fake_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        state ^= u64::from(byte);
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (0..dims)
        .map(|i| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407 + i as u64);
            ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}
