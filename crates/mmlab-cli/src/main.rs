//! mmlab CLI - Command-line interface
//!
//! Usage:
//!   mmlab ingest [--file PATH] [--persist]
//!   mmlab query <text> [-k N] [--file PATH | --from-db]
//!   mmlab stats [--file PATH | --from-db]
//!   mmlab export <out> [--file PATH | --from-db]
//!   mmlab serve

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use mmlab_core::{logging, AppConfig, ColumnStore, PgColumnStore};
use mmlab_ingest::{export_records, load_records, IngestConfig, IngestReport, IngestionPipeline};
use mmlab_rag::RetrievalService;
use mmlab_vector::{create_query_embedder, VectorCodec};

#[derive(Parser)]
#[command(name = "mmlab")]
#[command(about = "Multimodal document embedding store and retrieval")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and encode an embeddings batch
    Ingest {
        /// Embeddings JSON file (defaults to the configured file)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Write the encoded rows to PostgreSQL
        #[arg(long)]
        persist: bool,
    },
    /// Rank stored documents against a question
    Query {
        text: String,

        /// Number of results (defaults to the configured top-k)
        #[arg(short)]
        k: Option<usize>,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print document statistics
    Stats {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Write documents to a JSON file, ordered by key
    Export {
        out: PathBuf,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Start the HTTP API server
    Serve,
}

/// Where documents are loaded from
#[derive(Args)]
struct SourceArgs {
    /// Embeddings JSON file (defaults to the configured file)
    #[arg(long, conflicts_with = "from_db")]
    file: Option<PathBuf>,

    /// Load from the PostgreSQL documents table
    #[arg(long)]
    from_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    logging::init(&config.logging);

    match cli.command {
        Commands::Ingest { file, persist } => ingest(&config, file, persist).await,
        Commands::Query { text, k, source } => {
            let service = load_service(&config, &source).await?;
            let k = k.unwrap_or(service.default_top_k());
            let results = service.retrieve(&text, k).await?;
            if service.is_demo_mode() {
                println!("(demo mode: no query embedder configured)");
            }
            for (rank, result) in results.iter().enumerate() {
                println!("{:>2}. {:.6}  {}", rank + 1, result.score, result.key);
            }
            Ok(())
        }
        Commands::Stats { source } => {
            let service = load_service(&config, &source).await?;
            println!("{}", serde_json::to_string_pretty(&service.stats())?);
            Ok(())
        }
        Commands::Export { out, source } => {
            let service = load_service(&config, &source).await?;
            let written = export_records(&out, &service.snapshot())?;
            println!("Exported {} documents to {}", written, out.display());
            Ok(())
        }
        Commands::Serve => mmlab_api::serve(config).await,
    }
}

async fn ingest(config: &AppConfig, file: Option<PathBuf>, persist: bool) -> anyhow::Result<()> {
    let path = file.unwrap_or_else(|| config.ingestion.embeddings_file.clone());
    let batch = load_records(&path)?;

    let pipeline = IngestionPipeline::new(
        VectorCodec::new(config.vector.dimension),
        IngestConfig::from(&config.ingestion),
    )?;
    let (_, mut report) = pipeline.load_into_shadow(&batch.records);
    batch.complete(&mut report);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if persist {
        let store = connect(config).await?;
        let written = store.replace_all(&report.rows).await?;
        println!("Persisted {} rows to {}", written, store.table());
    }
    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgColumnStore> {
    let url = config
        .database
        .postgres_url
        .as_deref()
        .context("DATABASE_URL is required for database access")?;

    let store = PgColumnStore::new(
        url,
        &config.database.documents_table,
        config.database.pool_size,
    )
    .await?;
    store.init_schema().await?;
    Ok(store)
}

async fn load_service(config: &AppConfig, source: &SourceArgs) -> anyhow::Result<RetrievalService> {
    let embedder = create_query_embedder(&config.embedding, config.vector.dimension)?;
    let mut service = RetrievalService::new(config, embedder)?;

    let report = if source.from_db {
        service = service.with_column_store(Arc::new(connect(config).await?));
        service.restore().await?
    } else {
        let path = source
            .file
            .clone()
            .unwrap_or_else(|| config.ingestion.embeddings_file.clone());
        let mut batch = load_records(&path)?;
        let mut report = service.reload(batch.take_records()).await?;
        batch.complete(&mut report);
        report
    };

    report_skips(&report);
    Ok(service)
}

fn report_skips(report: &IngestReport) {
    if !report.is_clean() {
        eprintln!(
            "warning: skipped {} records ({})",
            report.skipped,
            report
                .errors_by_kind
                .iter()
                .map(|(kind, count)| format!("{kind}: {count}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}
