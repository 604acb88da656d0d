//! CLI entry point: builds the chatbot's vector index from a folder of PDFs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use medindex_core::{
    app_data_dir, build_index, load_chunks, load_config, select_embedder, select_store, Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "medindex")]
#[command(about = "Index PDFs into the medical chatbot's vector store")]
struct Cli {
    /// Config file (TOML). Defaults to config.toml in the data directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Load, split, embed and upsert every PDF in the source directory.
    Index,
    /// Load and split without embedding; print chunk counts per document.
    Scan {
        /// Directory to scan instead of the configured source directory.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Show where medindex looks for its config file.
    DataDir,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medindex=info,medindex_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Index) {
        Commands::Index => {
            let config = resolve_config(cli.config)?;
            let embedder = select_embedder(&config).context("embedding provider")?;
            let mut store = select_store(&config).context("vector store")?;
            let report = build_index(&config, embedder.as_ref(), store.as_mut())
                .await
                .with_context(|| format!("indexing {}", config.source_dir.display()))?;
            tracing::info!(
                documents = report.documents,
                chunks = report.chunks,
                upserted = report.upserted,
                store = %report.store,
                "index built"
            );
        }
        Commands::Scan { path } => {
            let mut config = resolve_config(cli.config)?;
            if let Some(path) = path {
                config.source_dir = path;
            }
            let (docs, chunks) = load_chunks(&config)?;
            let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
            for chunk in &chunks {
                let source = chunk
                    .metadata
                    .get(medindex_core::documents::SOURCE_KEY)
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                *per_source.entry(source).or_default() += 1;
            }
            println!(
                "Scanned {} document(s), {} chunk(s) under {}",
                docs.len(),
                chunks.len(),
                config.source_dir.display()
            );
            for (source, count) in per_source {
                println!("  {source}  {count} chunk(s)");
            }
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => anyhow::bail!("could not determine the data directory"),
        },
    }
    Ok(())
}

/// File (or defaults), then credentials from the environment, then validation.
fn resolve_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = load_config(path.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
