//! Reembed job lifecycle: idempotent start, progress, cancellation.

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use test_utils::{temp_store, MockPageRenderer, MockSpeechLoader, MockSpeechModel, TempStore};
use think_core::context::AppContext;
use think_core::types::{JobStatus, JobUpdate, NewMemory, JOB_TYPE_REEMBED};
use think_core::Error;

static DEAD_LLM: Once = Once::new();

async fn engine() -> (TempStore, AppContext) {
    DEAD_LLM.call_once(|| {
        unsafe { std::env::set_var("OLLAMA_BASE_URL", "http://127.0.0.1:9/v1") };
    });
    let fixture = temp_store().await;
    let ctx = AppContext::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        Arc::new(MockSpeechLoader::new(MockSpeechModel::silent())),
        Arc::new(MockPageRenderer),
    )
    .await
    .unwrap();
    (fixture, ctx)
}

async fn wait_terminal(ctx: &AppContext, id: uuid::Uuid) -> think_core::types::Job {
    for _ in 0..600 {
        let job = ctx.jobs.get_job(id).await.unwrap().unwrap();
        if !job.status.is_active() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn empty_store_completes_immediately() {
    let (_fixture, ctx) = engine().await;

    let (job, started) = ctx.jobs.start_reembed().await.unwrap();
    assert!(started);

    let done = wait_terminal(&ctx, job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.result.unwrap()["processed"], 0);
}

#[tokio::test]
async fn start_is_idempotent_while_a_job_is_active() {
    let (_fixture, ctx) = engine().await;

    // A pending job parked in the table stands in for a long-running one
    let parked = ctx
        .store
        .create_job(JOB_TYPE_REEMBED, None)
        .await
        .unwrap();

    let (job, started) = ctx.jobs.start_reembed().await.unwrap();
    assert!(!started);
    assert_eq!(job.id, parked.id);

    // After it terminates, a new start creates a new job
    ctx.store
        .update_job(parked.id, JobUpdate::status(JobStatus::Cancelled))
        .await
        .unwrap();
    let (job2, started2) = ctx.jobs.start_reembed().await.unwrap();
    assert!(started2);
    assert_ne!(job2.id, parked.id);
    wait_terminal(&ctx, job2.id).await;
}

#[tokio::test]
async fn cancellation_rules() {
    let (_fixture, ctx) = engine().await;

    let parked = ctx.store.create_job(JOB_TYPE_REEMBED, None).await.unwrap();
    let cancelled = ctx.jobs.cancel_job(parked.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    // Cancelling a terminal job conflicts; unknown jobs are NotFound
    assert!(matches!(
        ctx.jobs.cancel_job(parked.id).await,
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        ctx.jobs.cancel_job(uuid::Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_generation_counts_and_increments_attempts() {
    let (_fixture, ctx) = engine().await;
    let memory = ctx
        .store
        .create_memory(NewMemory::note("pending", "some content"))
        .await
        .unwrap();

    // The provider is unreachable: phase 1 fails the batch, increments the
    // retry governor, and the job still terminates
    let (job, _) = ctx.jobs.start_reembed().await.unwrap();
    let done = wait_terminal(&ctx, job.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.total, 1);
    assert_eq!(done.failed, 1);
    assert_eq!(done.processed, 0);

    let reloaded = ctx.store.get_memory(memory.id).await.unwrap().unwrap();
    assert!(reloaded.processing_attempts >= 1);
}
