//! Core data types for the document cache.
//!
//! These model the rows in the store (documents, chunks, queue jobs) and the
//! typed results returned by repository operations.

use serde::Serialize;

/// External identifying key for a cached document: a URL or a file path,
/// never both. Each key column carries its own uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocKey {
    Url(String),
    FilePath(String),
}

impl DocKey {
    /// Column name the key is stored under.
    pub fn column(&self) -> &'static str {
        match self {
            DocKey::Url(_) => "url",
            DocKey::FilePath(_) => "file_path",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            DocKey::Url(v) | DocKey::FilePath(v) => v,
        }
    }
}

/// A cached document, identified by URL or file path.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub needs_processing: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An embedded chunk of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
}

/// Queue job lifecycle. Terminal states are `Done` and `Failed`; nothing
/// moves a job back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "done" => Some(QueueStatus::Done),
            "failed" => Some(QueueStatus::Failed),
            _ => None,
        }
    }
}

/// A unit of deferred work: "(re)chunk and embed this document".
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: i64,
    pub document_id: i64,
    pub operation: String,
    pub priority: i64,
    pub status: QueueStatus,
    pub attempts: i64,
    pub error_message: Option<String>,
}

/// What an upsert did with the supplied content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Inserted => "inserted",
            UpsertAction::Updated => "updated",
            UpsertAction::Unchanged => "unchanged",
        }
    }
}

/// Result of [`crate::repository::upsert_document`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UpsertResult {
    pub action: UpsertAction,
    pub doc_id: i64,
}

/// Result of a cache lookup by key.
#[derive(Debug, Clone)]
pub struct CacheCheck {
    pub hit: bool,
    pub content: Option<String>,
    pub doc_id: Option<i64>,
}

/// A ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub doc_id: i64,
    pub title: Option<String>,
    pub chunk_text: String,
    pub similarity: f32,
    pub url: Option<String>,
    pub file_path: Option<String>,
}

/// Operational counters for `status`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStatus {
    pub documents: i64,
    pub chunks: i64,
    pub queue_pending: i64,
    pub queue_failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_status_round_trips() {
        for s in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Done,
            QueueStatus::Failed,
        ] {
            assert_eq!(QueueStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(QueueStatus::parse("cancelled"), None);
    }

    #[test]
    fn doc_key_columns() {
        assert_eq!(DocKey::Url("https://a".into()).column(), "url");
        assert_eq!(DocKey::FilePath("/tmp/a".into()).column(), "file_path");
        assert_eq!(DocKey::Url("https://a".into()).value(), "https://a");
    }
}
