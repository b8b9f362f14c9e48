//! Queue worker: the chunk + embed pipeline.
//!
//! [`drain`] claims pending jobs one at a time until the queue is empty.
//! Each job is processed in isolation: any failure is recorded against that
//! job and the loop moves on, so one bad document never halts the batch. The
//! loop is sequential within a process, but the atomic claim in the
//! repository makes it safe to run drain from several processes at once.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::models::QueueJob;
use crate::repository;
use crate::tokenizer::count_tokens;

/// Counters returned by [`drain`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DrainReport {
    pub processed: u64,
    pub failed: u64,
}

/// Process pending jobs until [`repository::claim_next_job`] returns `None`.
///
/// Per-job errors are swallowed into the `failed` counter after being
/// recorded via `fail_job`; only a failure to claim at all (i.e. the store
/// is unreachable) propagates as a hard error.
pub async fn drain(
    pool: &SqlitePool,
    config: &Config,
    embedder: &EmbeddingClient,
) -> Result<DrainReport> {
    let mut report = DrainReport::default();

    while let Some(job) = repository::claim_next_job(pool).await? {
        match process_one(pool, config, embedder, &job).await {
            Ok(chunk_count) => {
                tracing::info!(
                    doc_id = job.document_id,
                    job_id = job.id,
                    chunks = chunk_count,
                    "job complete"
                );
                report.processed += 1;
            }
            Err(e) => {
                tracing::error!(doc_id = job.document_id, job_id = job.id, error = %e, "job failed");
                repository::fail_job(pool, job.id, &e.to_string()).await?;
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        failed = report.failed,
        "queue drained"
    );
    Ok(report)
}

/// Run the pipeline for one claimed job: fetch content, chunk it, embed every
/// chunk, then atomically swap in the new chunk set and settle the job.
async fn process_one(
    pool: &SqlitePool,
    config: &Config,
    embedder: &EmbeddingClient,
    job: &QueueJob,
) -> Result<usize> {
    let (content, title) = repository::get_document_content(pool, job.document_id).await?;

    let chunks = chunk_text(
        &content,
        config.chunking.max_tokens,
        config.chunking.overlap_tokens,
    );
    tracing::info!(
        doc_id = job.document_id,
        chunks = chunks.len(),
        title = title.as_deref().unwrap_or("untitled"),
        "chunked document"
    );

    let embeddings = embedder.embed_texts(&chunks).await?;
    let token_counts: Vec<i64> = chunks.iter().map(|c| count_tokens(c) as i64).collect();

    repository::replace_chunks_and_complete(
        pool,
        job.document_id,
        job.id,
        &chunks,
        &embeddings,
        &token_counts,
    )
    .await
}
