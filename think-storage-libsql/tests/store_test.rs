//! CRUD behavior of the encrypted store.

use test_utils::{fake_embedding, temp_store};
use think_core::types::{
    DateFilter, LinkType, MemoryQuery, NewMemory, RetrievedSource, Role, TagSource,
    TranscriptSegment, TranscriptionStatus,
};
use think_core::Error;

#[tokio::test]
async fn memory_create_get_round_trip() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let created = store
        .create_memory(NewMemory::web(
            "https://x/y",
            "X — Y | Site",
            "a body of text",
        ))
        .await
        .unwrap();
    assert!(created.id > 0);
    assert_eq!(created.original_title.as_deref(), Some("X — Y | Site"));

    let fetched = store.get_memory(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.url.as_deref(), Some("https://x/y"));
    assert_eq!(fetched.content.as_deref(), Some("a body of text"));
    assert_eq!(fetched.processing_attempts, 0);
    assert!(fetched.embedding.is_none());
}

#[tokio::test]
async fn duplicate_url_lookup_returns_most_recent() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let first = store
        .create_memory(NewMemory::web("https://same", "One", "c1"))
        .await
        .unwrap();
    let second = store
        .create_memory(NewMemory::web("https://same", "Two", "c2"))
        .await
        .unwrap();

    let found = store.get_memory_by_url("https://same").await.unwrap().unwrap();
    assert_eq!(found.id, second.id);
    assert_ne!(found.id, first.id);
    assert!(store.get_memory_by_url("https://other").await.unwrap().is_none());
}

#[tokio::test]
async fn embedding_round_trips_bit_exact_through_storage() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let memory = store
        .create_memory(NewMemory::note("n", "c"))
        .await
        .unwrap();
    let embedding = fake_embedding("hello", 128);
    assert!(store
        .update_memory_embedding(memory.id, &embedding, "ollama:mxbai-embed-large")
        .await
        .unwrap());

    let fetched = store.get_memory(memory.id).await.unwrap().unwrap();
    assert_eq!(fetched.embedding.unwrap(), embedding);
    assert_eq!(
        fetched.embedding_model.as_deref(),
        Some("ollama:mxbai-embed-large")
    );
}

#[tokio::test]
async fn listing_filters_by_type_and_tag() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let web = store
        .create_memory(NewMemory::web("https://a", "Web one", "c"))
        .await
        .unwrap();
    let note = store
        .create_memory(NewMemory::note("Note one", "c"))
        .await
        .unwrap();
    store
        .add_tags_to_memory(web.id, &["Rust".to_string()], TagSource::Manual)
        .await
        .unwrap();

    let (all, total) = store
        .list_memories(MemoryQuery::with_limit(10))
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].id, note.id);

    let (notes, notes_total) = store
        .list_memories(MemoryQuery {
            limit: 10,
            type_filter: Some(think_core::types::MemoryType::Note),
            ..MemoryQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(notes_total, 1);
    assert_eq!(notes[0].id, note.id);

    let (tagged, tagged_total) = store
        .list_memories(MemoryQuery {
            limit: 10,
            tag_filter: Some("rust".to_string()),
            ..MemoryQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(tagged_total, 1);
    assert_eq!(tagged[0].id, web.id);
    assert_eq!(tagged[0].tags.len(), 1);

    let (recent, _) = store
        .list_memories(MemoryQuery {
            limit: 10,
            date_filter: Some(DateFilter::Today),
            ..MemoryQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn overlapping_tag_adds_do_not_duplicate() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let memory = store.create_memory(NewMemory::note("n", "c")).await.unwrap();

    let first = store
        .add_tags_to_memory(
            memory.id,
            &["rust".to_string(), "async".to_string()],
            TagSource::Ai,
        )
        .await
        .unwrap();
    assert_eq!(first.len(), 2);

    let second = store
        .add_tags_to_memory(
            memory.id,
            &["Rust ".to_string(), "tokio".to_string()],
            TagSource::Manual,
        )
        .await
        .unwrap();
    // Only the genuinely new tag is attached
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "tokio");

    let tags = store.memory_tags(memory.id).await.unwrap();
    assert_eq!(tags.len(), 3);

    // Usage counts drive tag ordering
    let all = store.all_tags().await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|t| t.usage_count == 1));
}

#[tokio::test]
async fn link_symmetry_and_conflicts() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let a = store.create_memory(NewMemory::note("a", "c")).await.unwrap();
    let b = store.create_memory(NewMemory::note("b", "c")).await.unwrap();

    store
        .create_link(a.id, b.id, LinkType::Manual, Some(0.9))
        .await
        .unwrap();

    // Second create in either direction conflicts
    assert!(matches!(
        store.create_link(a.id, b.id, LinkType::Manual, None).await,
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        store.create_link(b.id, a.id, LinkType::Manual, None).await,
        Err(Error::Conflict(_))
    ));

    // Symmetry: both endpoints see the link
    let from_a = store.memory_links(a.id).await.unwrap();
    let from_b = store.memory_links(b.id).await.unwrap();
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_a[0].memory_id, b.id);
    assert_eq!(from_b[0].memory_id, a.id);
    assert_eq!(from_b[0].relevance_score, Some(0.9));

    // Delete removes both rows; repeating is NotFound
    store.delete_link(a.id, b.id).await.unwrap();
    assert!(store.memory_links(a.id).await.unwrap().is_empty());
    assert!(store.memory_links(b.id).await.unwrap().is_empty());
    assert!(matches!(
        store.delete_link(a.id, b.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn link_validation() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let a = store.create_memory(NewMemory::note("a", "c")).await.unwrap();

    assert!(matches!(
        store.create_link(a.id, a.id, LinkType::Manual, None).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        store.create_link(a.id, 9999, LinkType::Manual, None).await,
        Err(Error::NotFound(_))
    ));
    let b = store.create_memory(NewMemory::note("b", "c")).await.unwrap();
    assert!(matches!(
        store.create_link(a.id, b.id, LinkType::Auto, Some(1.5)).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn batch_links_aggregate_failures() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let a = store.create_memory(NewMemory::note("a", "c")).await.unwrap();
    let b = store.create_memory(NewMemory::note("b", "c")).await.unwrap();
    let c = store.create_memory(NewMemory::note("c", "c")).await.unwrap();
    store
        .create_link(a.id, b.id, LinkType::Manual, None)
        .await
        .unwrap();

    let outcome = store
        .batch_create_links(&[
            (a.id, b.id, 0.8), // exists
            (a.id, c.id, 0.7),
            (b.id, 9999, 0.6), // missing target
        ])
        .await
        .unwrap();
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.errors.len(), 2);

    let linked = store.linked_memory_ids(a.id).await.unwrap();
    assert_eq!(linked.len(), 2);
}

#[tokio::test]
async fn conversations_messages_and_previews() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let conversation = store.create_conversation("").await.unwrap();
    let memory = store.create_memory(NewMemory::note("src", "c")).await.unwrap();

    store
        .add_message(conversation.id, Role::User, "hello there", &[], None)
        .await
        .unwrap()
        .unwrap();

    let long_reply = "r".repeat(250);
    let sources = vec![RetrievedSource {
        id: memory.id,
        title: Some("src".to_string()),
        url: None,
        distance: Some(0.12),
        match_type: None,
        rrf_score: Some(0.016),
    }];
    let usage = think_core::types::TokenUsage {
        prompt_tokens: 10,
        completion_tokens: 20,
        total_tokens: 30,
    };
    store
        .add_message(conversation.id, Role::Assistant, &long_reply, &sources, Some(usage))
        .await
        .unwrap()
        .unwrap();

    let detail = store.get_conversation(conversation.id).await.unwrap().unwrap();
    assert_eq!(detail.messages.len(), 2);
    let assistant = &detail.messages[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.total_tokens, Some(30));
    assert_eq!(assistant.sources.len(), 1);
    assert_eq!(assistant.sources[0].id, memory.id);

    // Preview truncates to 100 chars
    let listing = store.list_conversations(10, 0).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].message_count, 2);
    assert_eq!(listing[0].last_message.as_ref().unwrap().len(), 100);

    // Missing conversation yields None, not an error
    assert!(store
        .add_message(9999, Role::User, "x", &[], None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn pinned_conversations_list_first() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let old = store.create_conversation("old").await.unwrap();
    let newer = store.create_conversation("newer").await.unwrap();
    store
        .add_message(newer.id, Role::User, "bump", &[], None)
        .await
        .unwrap();
    store.set_conversation_pinned(old.id, true).await.unwrap();

    let listing = store.list_conversations(10, 0).await.unwrap();
    assert_eq!(listing[0].id, old.id);
    assert!(listing[0].pinned);
}

#[tokio::test]
async fn deleting_memory_cascades_to_joins() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let memory = store.create_memory(NewMemory::note("n", "c")).await.unwrap();
    let other = store.create_memory(NewMemory::note("o", "c")).await.unwrap();
    store
        .add_tags_to_memory(memory.id, &["tag".to_string()], TagSource::Manual)
        .await
        .unwrap();
    store
        .create_link(memory.id, other.id, LinkType::Manual, None)
        .await
        .unwrap();

    let conversation = store.create_conversation("t").await.unwrap();
    store
        .add_message(
            conversation.id,
            Role::Assistant,
            "cited",
            &[RetrievedSource {
                id: memory.id,
                title: None,
                url: None,
                distance: None,
                match_type: None,
                rrf_score: None,
            }],
            None,
        )
        .await
        .unwrap();

    assert!(store.delete_memory(memory.id).await.unwrap());
    assert!(!store.delete_memory(memory.id).await.unwrap());

    // Joins are gone with the memory
    assert!(store.memory_links(other.id).await.unwrap().is_empty());
    let detail = store.get_conversation(conversation.id).await.unwrap().unwrap();
    assert!(detail.messages[0].sources.is_empty());
}

#[tokio::test]
async fn transcript_update_backfills_duration_and_content() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let memory = store
        .create_memory(NewMemory {
            memory_type: Some(think_core::types::MemoryType::VoiceMemo),
            audio_path: Some("abc.webm.enc".to_string()),
            audio_format: Some("webm".to_string()),
            transcription_status: Some(TranscriptionStatus::Pending),
            ..NewMemory::default()
        })
        .await
        .unwrap();

    let segments = vec![
        TranscriptSegment {
            start: 0.0,
            end: 2.5,
            text: "hello".to_string(),
        },
        TranscriptSegment {
            start: 2.5,
            end: 7.25,
            text: "world".to_string(),
        },
    ];
    store
        .update_transcript(memory.id, "hello world", &segments)
        .await
        .unwrap();

    let fetched = store.get_memory(memory.id).await.unwrap().unwrap();
    assert_eq!(fetched.content.as_deref(), Some("hello world"));
    let audio = fetched.kind.audio().unwrap();
    assert_eq!(audio.audio_duration, Some(7.25));
    assert_eq!(audio.transcript_segments.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn transcription_retry_gate_is_atomic() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let memory = store
        .create_memory(NewMemory {
            memory_type: Some(think_core::types::MemoryType::Audio),
            audio_path: Some("a.mp3.enc".to_string()),
            transcription_status: Some(TranscriptionStatus::Failed),
            ..NewMemory::default()
        })
        .await
        .unwrap();

    assert!(store.begin_transcription_retry(memory.id).await.unwrap());

    store
        .set_transcription_status(memory.id, TranscriptionStatus::Processing)
        .await
        .unwrap();
    // A concurrent retry while processing must be rejected
    assert!(!store.begin_transcription_retry(memory.id).await.unwrap());
}

#[tokio::test]
async fn reprocessing_queries_respect_attempt_cap_and_model() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let model = "ollama:mxbai-embed-large";

    // One memory with no summary, one stale, one current
    let pending = store.create_memory(NewMemory::note("pending", "c")).await.unwrap();
    let stale = store.create_memory(NewMemory::note("stale", "c")).await.unwrap();
    store
        .update_memory_embedding_summary(stale.id, "Topic: stale")
        .await
        .unwrap();
    store
        .update_memory_embedding(stale.id, &fake_embedding("stale", 8), "openai:text-embedding-3-small")
        .await
        .unwrap();
    let current = store.create_memory(NewMemory::note("current", "c")).await.unwrap();
    store
        .update_memory_embedding_summary(current.id, "Topic: current")
        .await
        .unwrap();
    store
        .update_memory_embedding(current.id, &fake_embedding("current", 8), model)
        .await
        .unwrap();

    let counts = store.count_memories_needing_processing(model).await.unwrap();
    assert_eq!(counts.need_summary, 1);
    assert_eq!(counts.need_embedding, 1);
    assert_eq!(counts.total, 2);

    let without_summary = store.memories_without_embedding_summary(10).await.unwrap();
    assert_eq!(without_summary.len(), 1);
    assert_eq!(without_summary[0].id, pending.id);

    let needing = store.memories_needing_reembedding(model, 10).await.unwrap();
    assert_eq!(needing.len(), 1);
    assert_eq!(needing[0].id, stale.id);
    assert!(needing[0].embedding_summary.is_some());

    // Three failed attempts eject a memory from the summary queue
    for _ in 0..3 {
        store.increment_processing_attempts(pending.id).await.unwrap();
    }
    assert!(store
        .memories_without_embedding_summary(10)
        .await
        .unwrap()
        .is_empty());
    // The invariant holds: counts still include it, but the job would skip it
    let counts = store.count_memories_needing_processing(model).await.unwrap();
    assert_eq!(counts.need_summary, 1);
}

#[tokio::test]
async fn jobs_lifecycle_and_active_lookup() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let job = store
        .create_job("reembed", Some(serde_json::json!({"batch": 5})))
        .await
        .unwrap();
    let active = store.active_job("reembed").await.unwrap().unwrap();
    assert_eq!(active.id, job.id);

    store
        .update_job(
            job.id,
            think_core::types::JobUpdate {
                status: Some(think_core::types::JobStatus::Completed),
                progress: Some(100),
                completed_at: Some(chrono::Utc::now()),
                result: Some(serde_json::json!({"processed": 3, "failed": 0})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(store.active_job("reembed").await.unwrap().is_none());
    let done = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, think_core::types::JobStatus::Completed);
    assert_eq!(done.result.unwrap()["processed"], 3);
    assert_eq!(done.params.unwrap()["batch"], 5);
}
