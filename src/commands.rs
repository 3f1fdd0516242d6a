use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::indexer::{Chunk, CollectionOutcome, IngestReport, IngestRequest};
use crate::retrieval::{CategoryFilter, SearchOptions};

/// Load the configuration and connect the engine
#[inline]
pub async fn open_engine(config_dir: &Path) -> Result<Engine> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    Engine::new(config)
        .await
        .context("Failed to initialize engine")
}

/// Read a JSON array of chunks (`text` or `pageContent`, plus `metadata`)
#[inline]
pub fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunks file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse chunks file: {}", path.display()))
}

/// Search options from CLI flags, falling back to the configured defaults
#[inline]
pub fn search_options(
    config: &Config,
    file_id: Option<i64>,
    categories: Vec<String>,
    any_category: bool,
    limit: Option<usize>,
) -> SearchOptions {
    let mut options = SearchOptions::from_config(&config.retrieval);
    if any_category {
        options = options.with_categories(CategoryFilter::Any);
    } else if !categories.is_empty() {
        options = options.with_categories(CategoryFilter::OneOf(categories));
    }
    if let Some(file_id) = file_id {
        options = options.with_file_id(file_id);
    }
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }
    options
}

/// Index a chunks file into one collection
#[inline]
pub async fn index_file(config_dir: &Path, collection: &str, chunks_path: &Path) -> Result<()> {
    let chunks = read_chunks(chunks_path)?;
    let engine = open_engine(config_dir).await?;
    info!("Indexing {} chunks into {}", chunks.len(), collection);

    let report = engine.index_document(collection, chunks).await?;
    println!(
        "{} {} rows into {}",
        style("✓ Indexed").green(),
        report.inserted.len(),
        style(&report.collection).cyan()
    );
    if report.dropped > 0 {
        println!("  Skipped {} chunks without text", report.dropped);
    }
    Ok(())
}

fn print_outcomes<T>(outcomes: &[CollectionOutcome<T>], describe: impl Fn(&T) -> String) -> bool {
    let mut success = true;
    for outcome in outcomes {
        match &outcome.result {
            Ok(value) => println!(
                "  {} {}: {}",
                style("✓").green(),
                style(&outcome.collection).cyan(),
                describe(value)
            ),
            Err(e) => {
                success = false;
                println!(
                    "  {} {}: {}",
                    style("✗").red(),
                    style(&outcome.collection).cyan(),
                    e
                );
            }
        }
    }
    success
}

fn print_ingest_report(report: &IngestReport) -> Result<()> {
    println!("Ingestion job {}", style(report.job_id).dim());
    let success = print_outcomes(&report.outcomes, |r| {
        format!("{} rows inserted", r.inserted.len())
    });
    if !success {
        anyhow::bail!("Ingestion failed for one or more collections");
    }
    Ok(())
}

/// Index a chunks file into the artifacts, board and user collections
#[inline]
pub async fn ingest_file(
    config_dir: &Path,
    chunks_path: &Path,
    file_id: i64,
    board_id: Option<i64>,
    user_id: Option<i64>,
) -> Result<()> {
    let request = IngestRequest {
        file_id,
        board_id,
        user_id,
        chunks: read_chunks(chunks_path)?,
    };
    let engine = open_engine(config_dir).await?;
    let report = engine.ingest(request).await;
    print_ingest_report(&report)
}

/// Replace the rows of a file in every collection it belongs to
#[inline]
pub async fn reindex_file(
    config_dir: &Path,
    chunks_path: &Path,
    file_id: i64,
    board_id: Option<i64>,
    user_id: Option<i64>,
) -> Result<()> {
    let request = IngestRequest {
        file_id,
        board_id,
        user_id,
        chunks: read_chunks(chunks_path)?,
    };
    let engine = open_engine(config_dir).await?;
    let report = engine.reindex(request).await?;
    print_ingest_report(&report)
}

/// Remove one file's rows from one collection
#[inline]
pub async fn remove_file(config_dir: &Path, collection: &str, file_id: i64) -> Result<()> {
    let engine = open_engine(config_dir).await?;
    let report = engine.remove_file_index(collection, file_id).await?;

    if report.deleted == 0 {
        println!(
            "No rows for file {} in {}",
            file_id,
            style(collection).cyan()
        );
    } else {
        println!(
            "{} {} rows of file {} from {}",
            style("✓ Removed").green(),
            report.deleted,
            file_id,
            style(collection).cyan()
        );
    }
    Ok(())
}

/// Remove a file from the artifacts, board and user collections
#[inline]
pub async fn purge_file(
    config_dir: &Path,
    file_id: i64,
    board_id: Option<i64>,
    user_id: Option<i64>,
) -> Result<()> {
    let engine = open_engine(config_dir).await?;
    let outcomes = engine.remove(file_id, board_id, user_id).await;

    println!("Removing file {}", file_id);
    if !print_outcomes(&outcomes, |r| format!("{} rows deleted", r.deleted)) {
        anyhow::bail!("Removal failed for one or more collections");
    }
    Ok(())
}

#[inline]
pub async fn search(
    config_dir: &Path,
    collection: &str,
    query: &str,
    options: impl FnOnce(&Config) -> SearchOptions,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config_dir).await?;
    let options = options(engine.config());
    let context = engine.retrieve_context(collection, query, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    if context.chunks.is_empty() {
        println!("No results found");
        return Ok(());
    }

    for (rank, chunk) in context.chunks.iter().enumerate() {
        println!(
            "{} {} (page {}, {}, distance {:.4})",
            style(format!("{}.", rank + 1)).bold(),
            style(&chunk.metadata.filename).cyan(),
            chunk.metadata.page_number,
            chunk.category,
            chunk.distance
        );
        println!("   {}", chunk.content);
    }
    println!();
    println!("Sources: {}", style(context.sources.join(", ")).cyan());
    Ok(())
}

#[inline]
pub async fn release_collection(config_dir: &Path, collection: &str) -> Result<()> {
    let engine = open_engine(config_dir).await?;
    engine.release(collection).await?;
    println!("{} {}", style("✓ Released").green(), style(collection).cyan());
    Ok(())
}

/// Show a collection's lifecycle state and the embedding provider's health
#[inline]
pub async fn show_status(config_dir: &Path, collection: &str) -> Result<()> {
    let engine = open_engine(config_dir).await?;
    let status = engine.status(collection).await?;

    println!("{}", style("📊 Collection Status").bold().cyan());
    println!("  Name: {}", style(&status.name).cyan());
    println!("  State: {}", status.state);
    if let Some(rows) = status.rows {
        println!("  Rows: {}", rows);
    }
    if !status.indexes.is_empty() {
        println!("  Indexes: {}", status.indexes.join(", "));
    }

    println!();
    let embedder = engine.embedder();
    match embedder.health_check().await {
        Ok(()) => println!(
            "{} {} ({} dimensions)",
            style("✅ Embedding model ready:").green(),
            embedder.model(),
            embedder.dimension()
        ),
        Err(e) => {
            warn!("Embedding provider unhealthy: {}", e);
            println!("{} {}", style("⚠️  Embedding provider unavailable:").yellow(), e);
        }
    }
    Ok(())
}
