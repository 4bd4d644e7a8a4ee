//! Engine-level flows over a real encrypted store with mock model seams.
//!
//! The LLM endpoint is pointed at a dead local port, so generation steps
//! degrade to their documented empty-output behavior while storage, events,
//! transcription, and validation run for real.

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use test_utils::{temp_store, MockPageRenderer, MockSpeechLoader, MockSpeechModel, TempStore};
use think_core::context::AppContext;
use think_core::events::EventKind;
use think_core::types::{MemoryType, NewMemory, TranscriptionStatus, VideoProcessingStatus};
use think_core::Error;

static DEAD_LLM: Once = Once::new();

fn point_llm_at_dead_port() {
    DEAD_LLM.call_once(|| {
        // Discard port: connections fail immediately, the pipeline degrades
        unsafe { std::env::set_var("OLLAMA_BASE_URL", "http://127.0.0.1:9/v1") };
    });
}

async fn engine_with_speech(model: MockSpeechModel) -> (TempStore, AppContext) {
    point_llm_at_dead_port();
    let fixture = temp_store().await;
    let ctx = AppContext::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        Arc::new(MockSpeechLoader::new(model)),
        Arc::new(MockPageRenderer),
    )
    .await
    .unwrap();
    (fixture, ctx)
}

async fn wait_for_status(
    ctx: &AppContext,
    memory_id: i64,
    wanted: TranscriptionStatus,
) -> think_core::types::Memory {
    for _ in 0..300 {
        let memory = ctx.store.get_memory(memory_id).await.unwrap().unwrap();
        if memory.kind.audio().and_then(|a| a.transcription_status) == Some(wanted) {
            return memory;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("memory {memory_id} never reached {wanted:?}");
}

#[tokio::test]
async fn web_ingest_emits_created_and_dedupes_urls() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::silent()).await;
    let mut events = ctx.events.subscribe();

    let outcome = ctx
        .ingest
        .create_memory(NewMemory::web("https://x/y", "X — Y | Site", "body"))
        .await
        .unwrap();
    assert!(!outcome.is_duplicate());
    let id = outcome.memory().id;

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::MemoryCreated);
    assert_eq!(event.memory_id, id);

    // Same URL again: reported as duplicate, nothing new created
    let again = ctx
        .ingest
        .create_memory(NewMemory::web("https://x/y", "other", "body2"))
        .await
        .unwrap();
    assert!(again.is_duplicate());
    assert_eq!(again.memory().id, id);

    let (_, total) = ctx
        .store
        .list_memories(think_core::types::MemoryQuery::with_limit(10))
        .await
        .unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn voice_recording_flows_through_transcription() {
    let (_fixture, ctx) =
        engine_with_speech(MockSpeechModel::saying("remember to water the plants tomorrow"))
            .await;
    let mut events = ctx.events.subscribe();

    let memory = ctx
        .ingest
        .record_audio(b"fake webm audio", "webm", None)
        .await
        .unwrap();
    assert_eq!(memory.memory_type(), MemoryType::VoiceMemo);
    let audio = memory.kind.audio().unwrap();
    assert_eq!(audio.transcription_status, Some(TranscriptionStatus::Pending));
    let audio_path = audio.audio_path.clone().unwrap();

    // The blob landed encrypted and reads back decrypted
    let stored = ctx
        .vault
        .read(think_core::storage::BlobDomain::Audio, &audio_path)
        .await
        .unwrap();
    assert_eq!(stored, b"fake webm audio");

    let done = wait_for_status(&ctx, memory.id, TranscriptionStatus::Completed).await;
    assert_eq!(
        done.content.as_deref(),
        Some("remember to water the plants tomorrow")
    );
    let audio = done.kind.audio().unwrap();
    assert_eq!(
        audio.transcript.as_deref(),
        Some("remember to water the plants tomorrow")
    );
    // Duration backfilled from the last segment
    assert!(audio.audio_duration.is_some());

    // Created, then at least processing + terminal updates
    let mut kinds = Vec::new();
    while let Some(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(kinds[0], EventKind::MemoryCreated);
    assert!(kinds.iter().filter(|k| **k == EventKind::MemoryUpdated).count() >= 2);
}

#[tokio::test]
async fn empty_transcription_marks_memory_failed() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::silent()).await;

    let memory = ctx
        .ingest
        .record_audio(b"static noise", "wav", Some(1.0))
        .await
        .unwrap();
    let failed = wait_for_status(&ctx, memory.id, TranscriptionStatus::Failed).await;
    assert!(failed.kind.audio().unwrap().transcript.is_none());
}

#[tokio::test]
async fn audio_upload_validation() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::silent()).await;

    assert!(matches!(
        ctx.ingest.upload_audio(&[], "mp3", None).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        ctx.ingest.upload_audio(b"x", "exe", None).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn video_upload_and_extracted_audio_attach() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::saying("talk track")).await;

    // Range checks on client-supplied metadata
    assert!(matches!(
        ctx.ingest
            .upload_video(b"v", "mp4", "clip.mp4", Some(-1.0), None, None)
            .await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        ctx.ingest
            .upload_video(b"v", "mp4", "clip.mp4", None, Some(100_000), None)
            .await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        ctx.ingest
            .upload_video(b"v", "avi2", "clip.avi2", None, None, None)
            .await,
        Err(Error::Validation(_))
    ));

    let memory = ctx
        .ingest
        .upload_video(b"video bytes", "mp4", "clip.mp4", Some(12.5), Some(1920), Some(1080))
        .await
        .unwrap();
    assert_eq!(memory.title.as_deref(), Some("clip"));
    let video = memory.kind.video().unwrap();
    assert_eq!(
        video.video_processing_status,
        Some(VideoProcessingStatus::PendingExtraction)
    );

    // Thumbnail for someone else's memory id is a 404
    assert!(matches!(
        ctx.ingest.attach_video_thumbnail(9999, b"jpeg", "jpg").await,
        Err(Error::NotFound(_))
    ));

    ctx.ingest
        .attach_video_thumbnail(memory.id, b"jpeg bytes", "jpg")
        .await
        .unwrap();

    ctx.ingest
        .attach_video_audio(memory.id, b"extracted m4a", "m4a")
        .await
        .unwrap();

    let done = wait_for_status(&ctx, memory.id, TranscriptionStatus::Completed).await;
    assert_eq!(done.content.as_deref(), Some("talk track"));
    let video = done.kind.video().unwrap();
    assert_eq!(
        video.video_processing_status,
        Some(VideoProcessingStatus::Ready)
    );
    assert!(video.thumbnail_path.is_some());

    // Streaming accessors decrypt the right blobs
    assert_eq!(ctx.ingest.video_bytes(memory.id).await.unwrap(), b"video bytes");
    assert_eq!(ctx.ingest.audio_bytes(memory.id).await.unwrap(), b"extracted m4a");
    assert_eq!(
        ctx.ingest.thumbnail_bytes(memory.id).await.unwrap(),
        b"jpeg bytes"
    );
}

#[tokio::test]
async fn scanned_pdf_is_rejected_without_side_effects() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::silent()).await;

    assert!(matches!(
        ctx.ingest
            .upload_document(b"not a pdf at all", "pdf", "scan.pdf")
            .await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        ctx.ingest.upload_document(b"%PDF", "docx", "a.docx").await,
        Err(Error::Validation(_))
    ));

    let (_, total) = ctx
        .store
        .list_memories(think_core::types::MemoryQuery::with_limit(10))
        .await
        .unwrap();
    assert_eq!(total, 0, "no memory row may exist after a rejected upload");
}

#[tokio::test]
async fn retry_is_rejected_while_processing() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::saying("hello")).await;

    let memory = ctx
        .ingest
        .record_audio(b"audio", "mp3", Some(1.0))
        .await
        .unwrap();
    wait_for_status(&ctx, memory.id, TranscriptionStatus::Completed).await;

    ctx.store
        .set_transcription_status(memory.id, TranscriptionStatus::Processing)
        .await
        .unwrap();
    assert!(matches!(
        ctx.ingest.retry_transcription(memory.id).await,
        Err(Error::Conflict(_))
    ));

    ctx.store
        .set_transcription_status(memory.id, TranscriptionStatus::Failed)
        .await
        .unwrap();
    ctx.ingest.retry_transcription(memory.id).await.unwrap();
    wait_for_status(&ctx, memory.id, TranscriptionStatus::Completed).await;
}

#[tokio::test]
async fn media_delete_removes_blobs_and_row() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::saying("hello")).await;
    let mut events = ctx.events.subscribe();

    let memory = ctx
        .ingest
        .record_audio(b"audio", "ogg", Some(1.0))
        .await
        .unwrap();
    let audio_path = memory
        .kind
        .audio()
        .and_then(|a| a.audio_path.clone())
        .unwrap();
    wait_for_status(&ctx, memory.id, TranscriptionStatus::Completed).await;

    assert!(ctx.ingest.delete_memory(memory.id).await.unwrap());
    assert!(ctx.store.get_memory(memory.id).await.unwrap().is_none());
    assert!(matches!(
        ctx.vault
            .read(think_core::storage::BlobDomain::Audio, &audio_path)
            .await,
        Err(Error::NotFound(_))
    ));

    let mut saw_delete = false;
    while let Some(event) = events.try_recv() {
        if event.kind == EventKind::MemoryDeleted && event.memory_id == memory.id {
            saw_delete = true;
        }
    }
    assert!(saw_delete);
}

#[tokio::test]
async fn chat_without_provider_persists_error_reply() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::silent()).await;

    let outcome = ctx.chat.chat("hi", None).await.unwrap();
    assert!(outcome.response.is_none());
    assert!(outcome.error.is_some());

    // The failure is visible when the conversation is reopened
    let detail = ctx
        .store
        .get_conversation(outcome.conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.messages.len(), 2);
    assert!(detail.messages[1].content.contains("Cannot connect"));
    // Provisional title came from the message
    assert_eq!(detail.title, "hi");
}

#[tokio::test]
async fn quick_prompts_surface_specials_and_popular_tags() {
    let (_fixture, ctx) = engine_with_speech(MockSpeechModel::silent()).await;
    let store = &ctx.store;

    for i in 0..2 {
        let memory = store
            .create_memory(NewMemory::note(format!("note {i}"), "c"))
            .await
            .unwrap();
        store
            .add_tags_to_memory(
                memory.id,
                &["knowledge-graphs".to_string()],
                think_core::types::TagSource::Manual,
            )
            .await
            .unwrap();
    }

    let prompts = ctx.chat.quick_prompts().await;
    assert!(prompts.len() >= 3);
    assert_eq!(prompts[0].id, "recent-summary");
    assert_eq!(prompts[1].id, "find-connections");
    assert!(prompts
        .iter()
        .any(|p| p.text == "What have I saved about knowledge-graphs?"));

    // Cached: identical output within the TTL
    let again = ctx.chat.quick_prompts().await;
    assert_eq!(again.len(), prompts.len());
}
