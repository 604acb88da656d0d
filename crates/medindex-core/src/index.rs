//! Index pipeline: load → filter → split → create index → embed → upsert.

use crate::chunks::{Chunk, SplitError, TextSplitter};
use crate::config::Config;
use crate::documents::{minimal_docs, Document};
use crate::embeddings::{EmbedError, Embedder};
use crate::pdfs::{load_pdf_dir, LoadError};
use crate::store::{EmbeddedChunk, StoreError, VectorStore};

/// What a run did, for the caller to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
    pub upserted: usize,
    pub store: String,
}

/// Loads the PDFs under `config.source_dir`, keeps only their `source` metadata and
/// splits them with the configured chunk size and overlap. No network access.
pub fn load_chunks(config: &Config) -> Result<(Vec<Document>, Vec<Chunk>), IndexError> {
    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
    let docs = minimal_docs(load_pdf_dir(&config.source_dir)?);
    let chunks = splitter.split_documents(&docs);
    tracing::info!(
        documents = docs.len(),
        chunks = chunks.len(),
        chunk_size = splitter.chunk_size(),
        chunk_overlap = splitter.chunk_overlap(),
        "split documents"
    );
    Ok((docs, chunks))
}

/// Runs the full pipeline into `store`. Stops at the first error; nothing is retried.
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
    store: &mut dyn VectorStore,
) -> Result<IndexReport, IndexError> {
    let (docs, chunks) = load_chunks(config)?;
    store.create_if_absent().await?;
    let report = upsert_chunks(config, chunks, embedder, store).await?;
    Ok(IndexReport {
        documents: docs.len(),
        ..report
    })
}

/// Embed `chunks` and upsert them. Every vector must have `config.dimension` entries.
pub async fn upsert_chunks(
    config: &Config,
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    store: &mut dyn VectorStore,
) -> Result<IndexReport, IndexError> {
    let total = chunks.len();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    if embeddings.len() != total {
        return Err(EmbedError::CountMismatch {
            expected: total,
            got: embeddings.len(),
        }
        .into());
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != config.dimension) {
        return Err(IndexError::Dimension {
            expected: config.dimension,
            got: bad.len(),
        });
    }
    tracing::info!(count = total, embedder = embedder.name(), "embedded chunks");

    let items = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
        .collect();
    let upserted = store.upsert(items).await?;
    tracing::info!(count = upserted, store = store.name(), "upserted vectors");

    Ok(IndexReport {
        documents: 0,
        chunks: total,
        upserted,
        store: store.name().to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("split error: {0}")]
    Split(#[from] SplitError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("embedding has dimension {got}, index expects {expected}")]
    Dimension { expected: usize, got: usize },
}
