//! # Adawat Catalog CLI (`adawat`)
//!
//! Commands for initializing the cache, running the refresh pipeline,
//! and querying the published catalog.
//!
//! ## Usage
//!
//! ```bash
//! adawat --config ./config/adawat.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `adawat init` | Create the SQLite cache database |
//! | `adawat refresh` | Rebuild the catalog from the dataset source |
//! | `adawat schema` | Print the column names of the catalog |
//! | `adawat list` | Page through records with filtering and projection |
//! | `adawat get <index>` | Print one record by 1-based index |
//! | `adawat tags` | Print the tag index |

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use adawat::config::{self, Config};
use adawat::embedding::{create_provider, CachedEmbedder, EmbeddingProvider};
use adawat::query::{parse_features, ListParams, QueryEngine};
use adawat::refresh::{Refresher, RefreshPipeline};
use adawat::source::create_source;
use adawat::store::{CacheStore, SqliteStore};

/// Adawat Catalog — a refreshable catalog of dataset metadata with
/// derived tags, a 2-D layout, and clustering.
#[derive(Parser)]
#[command(
    name = "adawat",
    about = "Adawat Catalog — refresh and query a dataset metadata catalog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/adawat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database.
    ///
    /// Creates the SQLite file and cache table. Idempotent.
    Init,

    /// Rebuild the catalog from the dataset source.
    ///
    /// Fetches raw records, extracts tags, embeds each record, computes
    /// the 2-D layout and cluster assignments, and publishes the new
    /// generation. The previous generation stays visible until the
    /// publish succeeds.
    Refresh,

    /// Print the catalog's column names.
    Schema,

    /// List records with pagination, filtering, and projection.
    List {
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Page size; defaults to the whole catalog.
        #[arg(long)]
        size: Option<usize>,

        /// Comma-separated columns to keep; `all` keeps everything.
        #[arg(long, default_value = "all")]
        features: String,

        /// Filter expression, e.g. `Year >= 2020 && License == 'MIT'`.
        #[arg(long)]
        query: Option<String>,
    },

    /// Print one record by its 1-based index.
    Get {
        /// Record index, between 1 and the catalog length.
        index: usize,

        /// Comma-separated columns to keep; `all` keeps everything.
        #[arg(long, default_value = "all")]
        features: String,
    },

    /// Print the tag index.
    Tags {
        /// Comma-separated columns to keep; `all` keeps everything.
        #[arg(long, default_value = "all")]
        features: String,
    },
}

async fn run_refresh(cfg: &Config, store: Arc<dyn CacheStore>) -> Result<()> {
    let source = create_source(&cfg.source)?;
    let provider = create_provider(&cfg.embedding)?;
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(CachedEmbedder::new(provider, store.clone()));

    let pipeline = RefreshPipeline::new(Arc::from(source), embedder, store);
    let refresher = Refresher::new(pipeline);

    let handle = refresher.spawn()?;
    let summary = handle.await??;

    println!("refresh ok");
    println!("  records: {}", summary.records);
    println!("  tag columns: {}", summary.tag_columns);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let store: Arc<dyn CacheStore> = Arc::new(SqliteStore::connect(&cfg.cache.path).await?);

    match cli.command {
        Commands::Init => {
            // Connecting runs the migration.
            println!("Cache database initialized successfully.");
        }
        Commands::Refresh => {
            run_refresh(&cfg, store).await?;
        }
        Commands::Schema => {
            let engine = QueryEngine::new(store);
            let schema = engine.schema().await?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::List {
            page,
            size,
            features,
            query,
        } => {
            let engine = QueryEngine::new(store);
            let params = ListParams {
                page,
                size,
                features: parse_features(&features),
                query,
            };
            let records = engine.list(&params).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Get { index, features } => {
            let engine = QueryEngine::new(store);
            let record = engine.get(index, &parse_features(&features)).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Tags { features } => {
            let engine = QueryEngine::new(store);
            let tags = engine.tags(&parse_features(&features)).await?;
            println!("{}", serde_json::to_string_pretty(&tags)?);
        }
    }

    Ok(())
}
