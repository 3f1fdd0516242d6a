use anyhow::Result;
use clap::{Parser, Subcommand};
use rag_index::commands::{
    index_file, ingest_file, purge_file, reindex_file, release_collection, remove_file, search,
    search_options, show_status,
};
use rag_index::config::{Config, init_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-index")]
#[command(about = "Document chunk indexing and similarity retrieval over a vector store")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write a default config.toml
        #[arg(long)]
        init: bool,
    },
    /// Index a JSON file of chunks into one collection
    Index {
        collection: String,
        chunks: PathBuf,
    },
    /// Index a file's chunks into the artifacts, board and user collections
    Ingest {
        chunks: PathBuf,
        #[arg(long)]
        file_id: i64,
        #[arg(long)]
        board_id: Option<i64>,
        #[arg(long)]
        user_id: Option<i64>,
        /// Remove the file's existing rows first
        #[arg(long)]
        replace: bool,
    },
    /// Remove a file's rows from one collection
    Remove { collection: String, file_id: i64 },
    /// Remove a file's rows from the artifacts, board and user collections
    Purge {
        #[arg(long)]
        file_id: i64,
        #[arg(long)]
        board_id: Option<i64>,
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Search a collection
    Search {
        collection: String,
        query: String,
        /// Only return chunks of this file
        #[arg(long)]
        file_id: Option<i64>,
        /// Allowed chunk category, repeatable
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Do not filter by category
        #[arg(long, conflicts_with = "categories")]
        any_category: bool,
        #[arg(long)]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Release a collection from the serving set
    Release { collection: String },
    /// Show a collection's state and the embedding provider's health
    Status { collection: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::config_dir()?,
    };

    match cli.command {
        Commands::Config { show, init } => {
            if init {
                init_config(&config_dir)?;
            }
            if show || !init {
                show_config(&config_dir)?;
            }
        }
        Commands::Index { collection, chunks } => {
            index_file(&config_dir, &collection, &chunks).await?;
        }
        Commands::Ingest {
            chunks,
            file_id,
            board_id,
            user_id,
            replace,
        } => {
            if replace {
                reindex_file(&config_dir, &chunks, file_id, board_id, user_id).await?;
            } else {
                ingest_file(&config_dir, &chunks, file_id, board_id, user_id).await?;
            }
        }
        Commands::Remove {
            collection,
            file_id,
        } => {
            remove_file(&config_dir, &collection, file_id).await?;
        }
        Commands::Purge {
            file_id,
            board_id,
            user_id,
        } => {
            purge_file(&config_dir, file_id, board_id, user_id).await?;
        }
        Commands::Search {
            collection,
            query,
            file_id,
            categories,
            any_category,
            limit,
            json,
        } => {
            let options =
                |config: &Config| search_options(config, file_id, categories, any_category, limit);
            search(&config_dir, &collection, &query, options, json).await?;
        }
        Commands::Release { collection } => {
            release_collection(&config_dir, &collection).await?;
        }
        Commands::Status { collection } => {
            show_status(&config_dir, &collection).await?;
        }
    }

    Ok(())
}
