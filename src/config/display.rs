use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use super::settings::{Config, EmbeddingProviderKind, StoreBackend};

/// Write a default `config.toml` unless one already exists
#[inline]
pub fn init_config(config_dir: &Path) -> Result<()> {
    let config = Config {
        base_dir: config_dir.to_path_buf(),
        ..Config::default()
    };
    let config_path = config.config_file_path();

    if config_path.exists() {
        eprintln!(
            "{} {}",
            style("Configuration already exists:").yellow(),
            style(config_path.display()).cyan()
        );
        return Ok(());
    }

    config.save().context("Failed to write default configuration")?;
    eprintln!("{}", style("✓ Default configuration written").green());
    eprintln!("  {}", style(config_path.display()).cyan());
    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Vector Store:").bold().yellow());
    let backend = match config.vector_store.backend {
        StoreBackend::LanceDb => "lancedb",
        StoreBackend::Memory => "memory",
    };
    eprintln!("  Backend: {}", style(backend).cyan());
    eprintln!("  URI: {}", style(config.vector_store_uri()).cyan());
    eprintln!(
        "  HNSW: m={} ef_construction={}",
        style(config.vector_store.hnsw.m).cyan(),
        style(config.vector_store.hnsw.ef_construction).cyan()
    );
    eprintln!(
        "  ANN minimum rows: {}",
        style(config.vector_store.ann_min_rows).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Embeddings:").bold().yellow());
    let provider = match config.embeddings.provider {
        EmbeddingProviderKind::OpenAi => "openai",
        EmbeddingProviderKind::Ollama => "ollama",
    };
    eprintln!("  Provider: {}", style(provider).cyan());
    eprintln!("  Base URL: {}", style(&config.embeddings.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embeddings.model).cyan());
    eprintln!("  Dimension: {}", style(config.embeddings.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embeddings.batch_size).cyan());
    eprintln!(
        "  Max Concurrent Requests: {}",
        style(config.embeddings.max_concurrent_requests).cyan()
    );
    match &config.embeddings.api_key {
        Some(_) => eprintln!("  API Key: {}", style("set").green()),
        None => eprintln!("  API Key: {}", style("not set").red()),
    }

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Default Categories: {}",
        style(config.retrieval.default_categories.join(", ")).cyan()
    );
    eprintln!(
        "  Default Limit: {}",
        style(config.retrieval.default_limit).cyan()
    );

    if !config.indexing.allowed_extra_fields.is_empty() {
        eprintln!();
        eprintln!(
            "  Allowed Extra Metadata: {}",
            style(config.indexing.allowed_extra_fields.join(", ")).cyan()
        );
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}
