//! Hybrid search over the encrypted store.
//!
//! These exercise the fused CTE against a real database: vector ranking,
//! keyword ranking, RRF scores, and the vector-only fallback shape.

use test_utils::{fake_embedding, temp_store};
use think_core::types::{MatchType, NewMemory};

const DIMS: usize = 64;

async fn seeded() -> test_utils::TempStore {
    let fixture = temp_store().await;
    let store = &fixture.store;

    for (title, content, embed_key) in [
        (
            "React hooks tutorial",
            "Deep dive into useState and useEffect",
            "react hooks state effects",
        ),
        (
            "Fishing trip notes",
            "Caught two trout using new hooks and bait",
            "fishing trout bait outdoors",
        ),
        (
            "Sourdough starter",
            "Feeding schedule for the starter",
            "baking sourdough bread",
        ),
    ] {
        let memory = store
            .create_memory(NewMemory::note(title, content))
            .await
            .unwrap();
        store
            .update_memory_embedding(
                memory.id,
                &fake_embedding(embed_key, DIMS),
                "ollama:mxbai-embed-large",
            )
            .await
            .unwrap();
    }
    fixture
}

#[tokio::test]
async fn vector_only_search_ranks_by_distance() {
    let fixture = seeded().await;
    let query = fake_embedding("react hooks state effects", DIMS);

    let hits = fixture
        .store
        .search_similar(&query, 3, None)
        .await
        .unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].title.as_deref(), Some("React hooks tutorial"));
    // Identical embedding: distance ~0
    assert!(hits[0].distance.unwrap() < 1e-3);
    // Synthetic RRF score for rank 1
    assert!((hits[0].rrf_score - 1.0 / 61.0).abs() < 1e-6);
    assert!(hits.iter().all(|h| h.match_type == MatchType::Vector));
    // Ascending distance order
    assert!(hits[0].distance.unwrap() <= hits[1].distance.unwrap());
}

#[tokio::test]
async fn hybrid_search_fuses_vector_and_keyword_lists() {
    let fixture = seeded().await;
    let query = fake_embedding("react hooks state effects", DIMS);

    let hits = fixture
        .store
        .search_similar(&query, 5, Some("hooks"))
        .await
        .unwrap();

    assert!(!hits.is_empty());
    let top = &hits[0];
    // The React memory matches both lists: hybrid, with summed RRF
    assert_eq!(top.title.as_deref(), Some("React hooks tutorial"));
    assert_eq!(top.match_type, MatchType::Hybrid);
    assert!(top.rrf_score > 1.0 / 61.0);

    // The fishing note contains "hooks" literally but embeds far away;
    // it still shows up from the keyword side
    assert!(hits
        .iter()
        .any(|h| h.title.as_deref() == Some("Fishing trip notes")));
}

#[tokio::test]
async fn blank_keyword_query_degrades_to_vector_search() {
    let fixture = seeded().await;
    let query = fake_embedding("baking sourdough bread", DIMS);

    let hits = fixture
        .store
        .search_similar(&query, 2, Some("   "))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.match_type == MatchType::Vector));
    assert_eq!(hits[0].title.as_deref(), Some("Sourdough starter"));
}

#[tokio::test]
async fn memories_without_embeddings_are_invisible_to_vector_search() {
    let fixture = temp_store().await;
    fixture
        .store
        .create_memory(NewMemory::note("no embedding", "c"))
        .await
        .unwrap();

    let hits = fixture
        .store
        .search_similar(&fake_embedding("anything", DIMS), 10, None)
        .await
        .unwrap();
    assert!(hits.is_empty());
}
