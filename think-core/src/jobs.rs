//! Durable background jobs and the reembed worker.
//!
//! Jobs are rows in the encrypted store; the worker drives the
//! "reprocess all memories" operation in two phases with cooperative
//! cancellation at batch boundaries.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::enrichment::generators;
use crate::llm::LlmGateway;
use crate::storage::MemoryStore;
use crate::types::{Job, JobStatus, JobUpdate, JOB_TYPE_REEMBED};
use crate::error::{Error, Result};
use uuid::Uuid;

/// Phase 1 batch size; summary generation is LLM-bound, so keep it small.
const SUMMARY_BATCH_SIZE: usize = 5;
/// Phase 2 batch size; embedding-only work tolerates bigger batches.
const EMBED_BATCH_SIZE: usize = 10;

/// Inter-item sleeps so long jobs never starve other tasks.
const SUMMARY_ITEM_DELAY: Duration = Duration::from_millis(300);
const EMBED_ITEM_DELAY: Duration = Duration::from_millis(100);

/// Job manager plus the reembed worker entry points.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn MemoryStore>,
    gateway: LlmGateway,
}

impl JobService {
    pub fn new(store: Arc<dyn MemoryStore>, gateway: LlmGateway) -> Self {
        JobService { store, gateway }
    }

    /// Start a reembed job, or return the already-active one (idempotent).
    /// Returns `(job, started)`.
    pub async fn start_reembed(&self) -> Result<(Job, bool)> {
        if let Some(active) = self.store.active_job(JOB_TYPE_REEMBED).await? {
            info!("Reembed job {} already active", active.id);
            return Ok((active, false));
        }

        let job = self.store.create_job(JOB_TYPE_REEMBED, None).await?;
        let service = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            if let Err(e) = service.run_reembed(job_id).await {
                warn!("Reembed job {job_id} failed: {e}");
                let _ = service
                    .store
                    .update_job(
                        job_id,
                        JobUpdate {
                            status: Some(JobStatus::Failed),
                            error: Some(e.to_string()),
                            completed_at: Some(Utc::now()),
                            ..JobUpdate::default()
                        },
                    )
                    .await;
            }
        });
        Ok((job, true))
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        self.store.get_job(id).await
    }

    pub async fn active_job(&self, job_type: &str) -> Result<Option<Job>> {
        self.store.active_job(job_type).await
    }

    /// Request cooperative cancellation; the worker observes it at the next
    /// batch boundary.
    pub async fn cancel_job(&self, id: Uuid) -> Result<Job> {
        let job = self
            .store
            .get_job(id)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))?;
        if !job.status.is_active() {
            return Err(Error::Conflict(format!(
                "Job is already {}",
                job.status.as_str()
            )));
        }
        self.store
            .update_job(
                id,
                JobUpdate {
                    status: Some(JobStatus::Cancelled),
                    completed_at: Some(Utc::now()),
                    ..JobUpdate::default()
                },
            )
            .await?;
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn is_cancelled(&self, job_id: Uuid) -> bool {
        match self.store.get_job(job_id).await {
            Ok(Some(job)) => job.status == JobStatus::Cancelled,
            _ => true, // job vanished: stop quietly
        }
    }

    async fn set_progress(
        &self,
        job_id: Uuid,
        processed: i64,
        failed: i64,
        total: i64,
    ) -> Result<()> {
        let progress = if total > 0 {
            (((processed + failed) * 100) / total).min(99)
        } else {
            99
        };
        self.store
            .update_job(
                job_id,
                JobUpdate {
                    processed: Some(processed),
                    failed: Some(failed),
                    progress: Some(progress),
                    ..JobUpdate::default()
                },
            )
            .await?;
        Ok(())
    }

    /// The reembed worker.
    ///
    /// Phase 1 generates missing embedding summaries (and embeds them);
    /// phase 2 re-embeds memories whose stored vector is missing or was
    /// produced by a different model. Cancellation is honored between
    /// batches; a fully failed batch ends its phase to avoid livelock.
    pub async fn run_reembed(&self, job_id: Uuid) -> Result<()> {
        self.store
            .update_job(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Running),
                    started_at: Some(Utc::now()),
                    ..JobUpdate::default()
                },
            )
            .await?;

        let current_model = self.gateway.current_embedding_model();
        let counts = self
            .store
            .count_memories_needing_processing(&current_model)
            .await?;
        let total = counts.total as i64;

        if total == 0 {
            self.store
                .update_job(
                    job_id,
                    JobUpdate {
                        status: Some(JobStatus::Completed),
                        progress: Some(100),
                        completed_at: Some(Utc::now()),
                        result: Some(serde_json::json!({"processed": 0, "failed": 0})),
                        ..JobUpdate::default()
                    },
                )
                .await?;
            return Ok(());
        }

        self.store
            .update_job(
                job_id,
                JobUpdate {
                    total: Some(total),
                    ..JobUpdate::default()
                },
            )
            .await?;

        let mut processed = 0_i64;
        let mut failed = 0_i64;

        // Phase 1: generate embedding summaries, then embed them
        loop {
            if self.is_cancelled(job_id).await {
                info!("Job {job_id} was cancelled");
                return Ok(());
            }

            let batch = self
                .store
                .memories_without_embedding_summary(SUMMARY_BATCH_SIZE)
                .await?;
            if batch.is_empty() {
                break;
            }

            let mut batch_processed = 0_i64;
            let mut batch_failed = 0_i64;

            for memory in &batch {
                let outcome = self.summarize_and_embed(memory.id, memory).await;
                match outcome {
                    Ok(()) => {
                        batch_processed += 1;
                        debug!("Generated summary and embedded memory {}", memory.id);
                    }
                    Err(e) => {
                        warn!("Failed to process memory {}: {e}", memory.id);
                        let _ = self.store.increment_processing_attempts(memory.id).await;
                        batch_failed += 1;
                    }
                }
                tokio::time::sleep(SUMMARY_ITEM_DELAY).await;
            }

            processed += batch_processed;
            failed += batch_failed;
            self.set_progress(job_id, processed, failed, total).await?;

            if batch_processed == 0 && batch_failed == batch.len() as i64 {
                warn!("Job {job_id} phase 1: whole batch failed, moving to phase 2");
                break;
            }
        }

        // Phase 2: re-embed stale or missing vectors from existing summaries
        loop {
            if self.is_cancelled(job_id).await {
                info!("Job {job_id} was cancelled");
                return Ok(());
            }

            let current_model = self.gateway.current_embedding_model();
            let batch = self
                .store
                .memories_needing_reembedding(&current_model, EMBED_BATCH_SIZE)
                .await?;
            if batch.is_empty() {
                break;
            }

            let mut batch_processed = 0_i64;
            let mut batch_failed = 0_i64;

            for memory in &batch {
                let result = async {
                    let text = memory
                        .embedding_summary
                        .as_deref()
                        .ok_or_else(|| Error::Validation("Missing embedding summary".into()))?;
                    let embedding = self.gateway.embed(text).await?;
                    self.store
                        .update_memory_embedding(memory.id, &embedding, &current_model)
                        .await?;
                    Ok::<_, Error>(())
                }
                .await;

                match result {
                    Ok(()) => {
                        batch_processed += 1;
                        debug!("Re-embedded memory {}", memory.id);
                    }
                    Err(e) => {
                        warn!("Re-embedding failed for memory {}: {e}", memory.id);
                        batch_failed += 1;
                    }
                }
                tokio::time::sleep(EMBED_ITEM_DELAY).await;
            }

            processed += batch_processed;
            failed += batch_failed;
            self.set_progress(job_id, processed, failed, total).await?;

            if batch_processed == 0 && batch_failed == batch.len() as i64 {
                warn!("Job {job_id} phase 2: whole batch failed, stopping");
                break;
            }
        }

        self.store
            .update_job(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    progress: Some(100),
                    completed_at: Some(Utc::now()),
                    result: Some(serde_json::json!({
                        "processed": processed,
                        "failed": failed,
                    })),
                    ..JobUpdate::default()
                },
            )
            .await?;
        info!("Reembed job {job_id} completed: {processed} processed, {failed} failed");
        Ok(())
    }

    async fn summarize_and_embed(
        &self,
        memory_id: i64,
        memory: &crate::types::ReembedCandidate,
    ) -> Result<()> {
        let content = memory
            .content
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Validation("no content".to_string()))?;
        let title = memory.title.as_deref().unwrap_or("");

        let embedding_summary =
            generators::generate_embedding_summary(&self.gateway, content, title).await;
        if embedding_summary.is_empty() {
            return Err(Error::Validation("empty embedding summary".to_string()));
        }
        self.store
            .update_memory_embedding_summary(memory_id, &embedding_summary)
            .await?;

        let embedding = self.gateway.embed(&embedding_summary).await?;
        let model = self.gateway.current_embedding_model();
        self.store
            .update_memory_embedding(memory_id, &embedding, &model)
            .await?;
        Ok(())
    }
}
