//! Typed operations over the persisted store.
//!
//! Every function borrows a connection from the shared pool for one unit of
//! work. The two operations with correctness teeth are [`upsert_document`]
//! (compare-and-write plus enqueue inside one transaction, so concurrent
//! identical upserts cannot produce duplicate jobs) and [`claim_next_job`]
//! (a single conditional `UPDATE ... RETURNING`, so concurrent claimants can
//! never receive the same job).

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{
    CacheCheck, CacheStatus, Chunk, DocKey, Document, QueueJob, QueueStatus, SearchResult,
    UpsertAction, UpsertResult,
};

/// Operation label attached to jobs created by content changes.
const OP_CHUNK_AND_EMBED: &str = "chunk_and_embed";

/// Stored error messages are capped at this many characters.
const ERROR_MESSAGE_MAX_CHARS: usize = 500;

/// SHA-256 content fingerprint, hex-encoded.
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert or update a document identified by `key`, enqueueing a processing
/// job when the content actually changed.
///
/// The hash compare, the document write, and the job insert run in one
/// transaction: a racing identical upsert either sees the committed state
/// (and reports `unchanged`) or loses the unique-key race and surfaces a
/// query error instead of duplicating work.
pub async fn upsert_document(
    pool: &SqlitePool,
    key: &DocKey,
    title: Option<&str>,
    content: &str,
) -> Result<UpsertResult> {
    let hash = content_fingerprint(content);
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    let existing: Option<(i64, String)> = sqlx::query_as(&format!(
        "SELECT id, content_hash FROM documents WHERE {} = ?",
        key.column()
    ))
    .bind(key.value())
    .fetch_optional(&mut *tx)
    .await?;

    let result = match existing {
        None => {
            let (url, file_path) = match key {
                DocKey::Url(v) => (Some(v.as_str()), None),
                DocKey::FilePath(v) => (None, Some(v.as_str())),
            };
            let (doc_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO documents
                    (url, file_path, title, content, content_hash, needs_processing, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 1, ?, ?)
                RETURNING id
                "#,
            )
            .bind(url)
            .bind(file_path)
            .bind(title)
            .bind(content)
            .bind(&hash)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            enqueue_job(&mut tx, doc_id, now).await?;
            UpsertResult {
                action: UpsertAction::Inserted,
                doc_id,
            }
        }
        Some((doc_id, stored_hash)) if stored_hash == hash => UpsertResult {
            action: UpsertAction::Unchanged,
            doc_id,
        },
        Some((doc_id, _)) => {
            sqlx::query(
                r#"
                UPDATE documents
                SET title = ?, content = ?, content_hash = ?, needs_processing = 1, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(title)
            .bind(content)
            .bind(&hash)
            .bind(now)
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

            enqueue_job(&mut tx, doc_id, now).await?;
            UpsertResult {
                action: UpsertAction::Updated,
                doc_id,
            }
        }
    };

    tx.commit().await?;
    tracing::debug!(doc_id = result.doc_id, action = result.action.as_str(), "upsert");
    Ok(result)
}

async fn enqueue_job(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc_id: i64,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO processing_queue (document_id, operation, priority, status, attempts, created_at)
        VALUES (?, ?, 0, 'pending', 0, ?)
        "#,
    )
    .bind(doc_id)
    .bind(OP_CHUNK_AND_EMBED)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Cache lookup by identifying key.
pub async fn check_key(pool: &SqlitePool, key: &DocKey) -> Result<CacheCheck> {
    let row: Option<(i64, String)> = sqlx::query_as(&format!(
        "SELECT id, content FROM documents WHERE {} = ?",
        key.column()
    ))
    .bind(key.value())
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some((id, content)) => CacheCheck {
            hit: true,
            content: Some(content),
            doc_id: Some(id),
        },
        None => CacheCheck {
            hit: false,
            content: None,
            doc_id: None,
        },
    })
}

/// Fetch a full document row by key.
pub async fn get_document(pool: &SqlitePool, key: &DocKey) -> Result<Option<Document>> {
    let row: Option<(
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
        String,
        i64,
        i64,
        i64,
    )> = sqlx::query_as(&format!(
        r#"
        SELECT id, url, file_path, title, content, content_hash,
               needs_processing, created_at, updated_at
        FROM documents WHERE {} = ?
        "#,
        key.column()
    ))
    .bind(key.value())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(id, url, file_path, title, content, content_hash, needs, created_at, updated_at)| {
            Document {
                id,
                url,
                file_path,
                title,
                content,
                content_hash,
                needs_processing: needs != 0,
                created_at,
                updated_at,
            }
        },
    ))
}

/// Fetch a document's content and title for processing.
pub async fn get_document_content(
    pool: &SqlitePool,
    doc_id: i64,
) -> Result<(String, Option<String>)> {
    let row: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT content, title FROM documents WHERE id = ?")
            .bind(doc_id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(|| Error::Query(format!("document {doc_id} not found")))
}

/// All chunks for a document, ordered by index.
pub async fn get_chunks(pool: &SqlitePool, doc_id: i64) -> Result<Vec<Chunk>> {
    let rows: Vec<(i64, i64, i64, String, i64)> = sqlx::query_as(
        r#"
        SELECT id, document_id, chunk_index, content, token_count
        FROM chunks WHERE document_id = ?
        ORDER BY chunk_index
        "#,
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, document_id, chunk_index, content, token_count)| Chunk {
            id,
            document_id,
            chunk_index,
            content,
            token_count,
        })
        .collect())
}

/// Atomically claim the next pending job: highest priority first, ties broken
/// by lowest id. Returns `None` when the queue is drained.
///
/// The claim is one conditional `UPDATE ... RETURNING`; SQLite's single-writer
/// model makes it impossible for two claimants to both match the same row, so
/// a concurrent caller simply selects the next pending row (or none).
pub async fn claim_next_job(pool: &SqlitePool) -> Result<Option<QueueJob>> {
    let now = chrono::Utc::now().timestamp();

    let row: Option<(i64, i64, String, i64, String, i64, Option<String>)> = sqlx::query_as(
        r#"
        UPDATE processing_queue
        SET status = 'processing', started_at = ?, attempts = attempts + 1
        WHERE id = (
            SELECT id FROM processing_queue
            WHERE status = 'pending'
            ORDER BY priority DESC, id ASC
            LIMIT 1
        )
        AND status = 'pending'
        RETURNING id, document_id, operation, priority, status, attempts, error_message
        "#,
    )
    .bind(now)
    .fetch_optional(pool)
    .await?;

    row.map(
        |(id, document_id, operation, priority, status, attempts, error_message)| {
            let status = QueueStatus::parse(&status)
                .ok_or_else(|| Error::Query(format!("unknown queue status '{status}'")))?;
            Ok(QueueJob {
                id,
                document_id,
                operation,
                priority,
                status,
                attempts,
                error_message,
            })
        },
    )
    .transpose()
}

/// Mark a job done.
pub async fn complete_job(pool: &SqlitePool, job_id: i64) -> Result<()> {
    sqlx::query("UPDATE processing_queue SET status = 'done', completed_at = ? WHERE id = ?")
        .bind(chrono::Utc::now().timestamp())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a job failed with a truncated error message.
///
/// Failed jobs are terminal: nothing in this crate re-queues them. A fresh
/// content change for the same document enqueues new work instead.
pub async fn fail_job(pool: &SqlitePool, job_id: i64, error: &str) -> Result<()> {
    sqlx::query("UPDATE processing_queue SET status = 'failed', error_message = ? WHERE id = ?")
        .bind(truncate_error(error))
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Replace a document's entire chunk set and settle its job, atomically.
///
/// Deleting old chunks, inserting the new set, marking the job done, and
/// clearing the needs-processing flag commit together, so a crash can never
/// leave a completed job alongside a stale chunk set.
pub async fn replace_chunks_and_complete(
    pool: &SqlitePool,
    doc_id: i64,
    job_id: i64,
    chunks: &[String],
    embeddings: &[Vec<f32>],
    token_counts: &[i64],
) -> Result<usize> {
    if chunks.len() != embeddings.len() || chunks.len() != token_counts.len() {
        return Err(Error::Query(format!(
            "chunk set mismatch: {} chunks, {} embeddings, {} token counts",
            chunks.len(),
            embeddings.len(),
            token_counts.len()
        )));
    }

    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    for (index, ((content, embedding), tokens)) in
        chunks.iter().zip(embeddings).zip(token_counts).enumerate()
    {
        sqlx::query(
            r#"
            INSERT INTO chunks (document_id, chunk_index, content, embedding, token_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc_id)
        .bind(index as i64)
        .bind(content)
        .bind(vec_to_blob(embedding))
        .bind(tokens)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE processing_queue SET status = 'done', completed_at = ? WHERE id = ?")
        .bind(now)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE documents SET needs_processing = 0 WHERE id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(chunks.len())
}

/// Rank stored chunks against a query embedding.
///
/// SQLite has no native vector ranking function, so candidate vectors are
/// loaded (optionally pre-filtered by keyword) and scored by cosine
/// similarity in process, then cut at `threshold` and `limit`.
pub async fn search(
    pool: &SqlitePool,
    embedding: &[f32],
    keyword: Option<&str>,
    limit: i64,
    threshold: f32,
) -> Result<Vec<SearchResult>> {
    let base = r#"
        SELECT c.document_id, d.title, c.content, c.embedding, d.url, d.file_path
        FROM chunks c
        JOIN documents d ON d.id = c.document_id
    "#;

    let rows: Vec<(i64, Option<String>, String, Vec<u8>, Option<String>, Option<String>)> =
        match keyword {
            Some(kw) => {
                sqlx::query_as(&format!("{base} WHERE c.content LIKE ?"))
                    .bind(format!("%{kw}%"))
                    .fetch_all(pool)
                    .await?
            }
            None => sqlx::query_as(base).fetch_all(pool).await?,
        };

    let mut results: Vec<SearchResult> = rows
        .into_iter()
        .filter_map(|(doc_id, title, chunk_text, blob, url, file_path)| {
            let similarity = cosine_similarity(embedding, &blob_to_vec(&blob));
            (similarity >= threshold).then_some(SearchResult {
                doc_id,
                title,
                chunk_text,
                similarity,
                url,
                file_path,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit.max(0) as usize);
    Ok(results)
}

/// Operational counters: documents, chunks, pending and failed jobs.
pub async fn get_status(pool: &SqlitePool) -> Result<CacheStatus> {
    let (documents,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let (chunks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let (queue_pending,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM processing_queue WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;
    let (queue_failed,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM processing_queue WHERE status = 'failed'")
            .fetch_one(pool)
            .await?;

    Ok(CacheStatus {
        documents,
        chunks,
        queue_pending,
        queue_failed,
    })
}

fn truncate_error(error: &str) -> String {
    match error.char_indices().nth(ERROR_MESSAGE_MAX_CHARS) {
        Some((idx, _)) => error[..idx].to_string(),
        None => error.to_string(),
    }
}
