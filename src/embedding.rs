//! Embedding client for an Ollama-style backend.
//!
//! One request per text is issued against `POST {base_url}/api/embed`; the
//! backend has no batch endpoint we rely on. Transient failures (connect
//! errors, timeouts) are retried with bounded exponential backoff via
//! [`crate::retry::with_backoff`]; a missing model or a vector of the wrong
//! dimensionality is fatal and surfaces immediately.
//!
//! Also provides the vector utilities used by storage and search:
//! [`vec_to_blob`] / [`blob_to_vec`] encode embeddings as little-endian f32
//! BLOBs, and [`cosine_similarity`] ranks candidate chunks.

use std::time::Duration;

use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::retry::{with_backoff, Backoff};

/// Hard cap on characters sent per request. Chunking already bounds token
/// counts, but URL-heavy or JSON-heavy content can approach one token per
/// character, so this lossy safety net guards the backend's context window.
const EMBED_MAX_CHARS: usize = 7500;

/// Client for the external embedding service.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    backoff: Backoff,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::EmbeddingConnection(format!("build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            backoff: Backoff {
                attempts: config.max_retries.max(1),
                ..Backoff::default()
            },
        })
    }

    /// Vector dimensionality this client expects from the backend.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed a batch of texts, one request per text, order preserved.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let embedding = with_backoff(self.backoff, || self.embed_once(text)).await?;
            embeddings.push(embedding);
        }
        tracing::info!(count = texts.len(), dims = self.dims, "embedded texts");
        Ok(embeddings)
    }

    /// Embed a single text, e.g. a search query.
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_texts(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| Error::EmbeddingResponse("empty embedding response".into()))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_chars(text, EMBED_MAX_CHARS);

        let resp = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::EmbeddingConnection(format!(
                        "cannot connect to embedding backend at {}: {e}",
                        self.base_url
                    ))
                } else if e.is_timeout() {
                    Error::EmbeddingConnection(format!("embedding request timed out: {e}"))
                } else {
                    Error::EmbeddingResponse(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(Error::EmbeddingModel(format!(
                "model '{}' not found; pull it on the backend first",
                self.model
            )));
        }
        if !status.is_success() {
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(Error::EmbeddingResponse(format!(
                "backend returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| Error::EmbeddingResponse(format!("invalid response body: {e}")))?;

        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingResponse("response carried no embeddings".into()))?;

        if embedding.len() != self.dims {
            return Err(Error::EmbeddingResponse(format!(
                "expected {} dims, got {}",
                self.dims,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
/// Logs when content is actually cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::warn!(
                from = text.chars().count(),
                to = max_chars,
                "truncating text for embedding"
            );
            text[..byte_idx].to_string()
        }
        None => text.to_string(),
    }
}

/// Encode an embedding as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo wörld".repeat(10);
        let cut = truncate_chars(&text, 15);
        assert_eq!(cut.chars().count(), 15);
        assert!(text.starts_with(&cut));

        let short = "short";
        assert_eq!(truncate_chars(short, 100), short);
    }
}
