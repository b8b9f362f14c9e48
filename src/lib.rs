//! # docstash
//!
//! A document cache and embedding pipeline with a durable processing queue.
//!
//! Documents arrive by URL or file path, are deduplicated by content
//! fingerprint, and changed content is queued for background processing:
//! token-bounded chunking, per-chunk embeddings from an external backend,
//! and persistence for similarity search.
//!
//! ```text
//! upsert ──▶ documents ──▶ processing_queue ──▶ drain
//!                                                │
//!                              chunk ▶ embed ▶ replace chunks
//!                                                │
//!                                  search ◀── chunks + vectors
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`tokenizer`] | Token counting (`cl100k_base`) |
//! | [`chunk`] | Token-bounded chunking with overlap |
//! | [`embedding`] | Embedding client with retry/backoff |
//! | [`repository`] | Typed store operations: upsert, queue, search |
//! | [`worker`] | Drain loop |
//! | [`migrate`] | Schema migrations |
//! | [`db`] | Connection pool |
//! | [`error`] | Error taxonomy with retryable flags |
//! | [`retry`] | Bounded exponential backoff |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod migrate;
pub mod models;
pub mod repository;
pub mod retry;
pub mod tokenizer;
pub mod worker;
