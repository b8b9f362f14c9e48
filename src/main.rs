//! # docstash CLI
//!
//! Thin command-line surface over the cache library.
//!
//! ```bash
//! docstash --config ./config/docstash.toml migrate
//! docstash store --file ./notes.md
//! docstash store --url https://example.com/doc < body.txt
//! docstash check --url https://example.com/doc
//! docstash search "connection pooling" --limit 5
//! docstash drain
//! docstash status
//! ```
//!
//! Commands print JSON where the output is structured, so the binary can be
//! scripted against.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use docstash::config::{load_config, Config};
use docstash::db;
use docstash::embedding::EmbeddingClient;
use docstash::migrate;
use docstash::models::DocKey;
use docstash::repository;
use docstash::worker;

/// docstash — a document cache and embedding pipeline with a durable
/// processing queue.
#[derive(Parser)]
#[command(
    name = "docstash",
    about = "Document cache and embedding pipeline with a durable processing queue",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docstash.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations. Idempotent.
    Migrate,

    /// Store a document by URL or file path.
    ///
    /// With --file, content is read from the file. With --url, content is
    /// read from stdin. Re-storing unchanged content is a no-op.
    Store {
        /// Identifying URL for the document.
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,

        /// Identifying file path; the file's contents are stored.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Document title. Defaults to the file name when --file is given.
        #[arg(long)]
        title: Option<String>,
    },

    /// Check whether a key is cached; prints the content on a hit.
    Check {
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Embed the query and rank cached chunks by similarity.
    Search {
        query: String,

        /// Require this substring in matching chunks.
        #[arg(long)]
        keyword: Option<String>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Process pending queue jobs until the queue is empty.
    Drain,

    /// Print cache counters: documents, chunks, pending and failed jobs.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Migrate => cmd_migrate(&config).await,
        Commands::Store { url, file, title } => cmd_store(&config, url, file, title).await,
        Commands::Check { url, file } => cmd_check(&config, url, file).await,
        Commands::Search {
            query,
            keyword,
            limit,
            threshold,
        } => cmd_search(&config, &query, keyword.as_deref(), limit, threshold).await,
        Commands::Drain => cmd_drain(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

async fn cmd_migrate(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    let applied = migrate::run_migrations(&pool).await?;
    println!("{}", serde_json::json!({ "applied": applied }));
    pool.close().await;
    Ok(())
}

fn resolve_key(url: Option<String>, file: Option<&PathBuf>) -> Result<DocKey> {
    match (url, file) {
        (Some(url), None) => Ok(DocKey::Url(url)),
        (None, Some(path)) => Ok(DocKey::FilePath(path.display().to_string())),
        _ => bail!("exactly one of --url or --file is required"),
    }
}

async fn cmd_store(
    config: &Config,
    url: Option<String>,
    file: Option<PathBuf>,
    title: Option<String>,
) -> Result<()> {
    let key = resolve_key(url, file.as_ref())?;

    let (content, title) = match &file {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let title = title.or_else(|| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });
            (content, title)
        }
        None => {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            (content, title)
        }
    };
    let pool = db::connect(&config.db).await?;
    let result = repository::upsert_document(&pool, &key, title.as_deref(), &content).await?;
    println!("{}", serde_json::to_string(&result)?);
    pool.close().await;
    Ok(())
}

async fn cmd_check(config: &Config, url: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let key = resolve_key(url, file.as_ref())?;
    let pool = db::connect(&config.db).await?;
    let check = repository::check_key(&pool, &key).await?;
    if check.hit {
        println!("{}", check.content.unwrap_or_default());
    } else {
        println!("CACHE_MISS");
    }
    pool.close().await;
    Ok(())
}

async fn cmd_search(
    config: &Config,
    query: &str,
    keyword: Option<&str>,
    limit: Option<i64>,
    threshold: Option<f32>,
) -> Result<()> {
    let embedder = EmbeddingClient::new(&config.embedding)?;
    let embedding = embedder.embed_single(query).await?;

    let pool = db::connect(&config.db).await?;
    let results = repository::search(
        &pool,
        &embedding,
        keyword,
        limit.unwrap_or(config.search.default_limit),
        threshold.unwrap_or(config.search.default_threshold),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    pool.close().await;
    Ok(())
}

async fn cmd_drain(config: &Config) -> Result<()> {
    let embedder = EmbeddingClient::new(&config.embedding)?;
    let pool = db::connect(&config.db).await?;
    let report = worker::drain(&pool, config, &embedder).await?;
    println!("{}", serde_json::to_string(&report)?);
    pool.close().await;
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    let status = repository::get_status(&pool).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    pool.close().await;
    Ok(())
}
