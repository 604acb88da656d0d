//! Vector stores the pipeline upserts into: a Pinecone index, or an in-memory fallback
//! used when no Pinecone key is configured. The in-memory store is discarded when the
//! process exits.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::chunks::Chunk;
use crate::config::Config;
use crate::pinecone::PineconeStore;

/// A chunk with its embedding, ready to upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Make sure the target index exists. Must not recreate an existing one.
    async fn create_if_absent(&mut self) -> Result<(), StoreError>;

    /// Insert or overwrite vectors keyed by [`Chunk::id`]. Returns how many were written.
    async fn upsert(&mut self, items: Vec<EmbeddedChunk>) -> Result<usize, StoreError>;

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// Pinecone when an API key is configured, otherwise the in-memory store.
/// The in-memory branch builds no HTTP client and makes no network calls.
pub fn select_store(config: &Config) -> Result<Box<dyn VectorStore>, StoreError> {
    match config.remote_api_key() {
        Some(key) => {
            tracing::info!(index = %config.index_name, "using Pinecone index");
            Ok(Box::new(PineconeStore::new(
                key,
                &config.index_name,
                config.dimension,
                &config.pinecone,
            )?))
        }
        None => {
            tracing::info!("no Pinecone API key, using in-memory store");
            Ok(Box::new(InMemoryStore::new()))
        }
    }
}

/// A stored chunk and its unit-length embedding (cosine similarity via dot product).
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    pub chunk: Chunk,
    embedding: Vec<f32>,
}

impl IndexedChunk {
    #[cfg(test)]
    pub(crate) fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// Process-local store. Upserting an existing id replaces it in place. All vectors
/// share the dimension of the first one stored.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Vec<IndexedChunk>,
    positions: HashMap<String, usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one chunk. Embedding is normalized before storage.
    fn insert(&mut self, chunk: Chunk, embedding: Vec<f32>) -> Result<(), StoreError> {
        if let Some(first) = self.items.first() {
            if first.embedding.len() != embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    name: "in-memory".to_string(),
                    existing: first.embedding.len(),
                    expected: embedding.len(),
                });
            }
        }
        let id = chunk.id();
        let item = IndexedChunk {
            id: id.clone(),
            chunk,
            embedding: normalize(&embedding),
        };
        match self.positions.get(&id) {
            Some(&pos) => self.items[pos] = item,
            None => {
                self.positions.insert(id, self.items.len());
                self.items.push(item);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: &str) -> Option<&IndexedChunk> {
        self.positions.get(id).map(|&pos| &self.items[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedChunk> {
        self.items.iter()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_if_absent(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(&mut self, items: Vec<EmbeddedChunk>) -> Result<usize, StoreError> {
        let n = items.len();
        for item in items {
            self.insert(item.chunk, item.embedding)?;
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid Pinecone API key header value")]
    InvalidApiKey,
    #[error("invalid X-Pinecone-API-Version header value: {0:?}")]
    InvalidApiVersion(String),
    #[error("invalid Pinecone URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Pinecone request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Pinecone returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("index {name} has dimension {existing}, expected {expected}")]
    DimensionMismatch {
        name: String,
        existing: usize,
        expected: usize,
    },
    #[error("index {0} does not exist")]
    IndexNotFound(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::documents::{Metadata, SOURCE_KEY};

    fn chunk(index: usize, text: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.into(), json!("data/guide.pdf"));
        Chunk {
            text: text.to_string(),
            metadata,
            index,
            start: 0,
        }
    }

    #[test]
    fn missing_key_selects_in_memory() {
        let store = select_store(&Config::default()).unwrap();
        assert_eq!(store.name(), "in-memory");
    }

    #[test]
    fn blank_key_selects_in_memory() {
        let config = Config {
            remote_api_key: Some("   ".into()),
            ..Config::default()
        };
        assert_eq!(select_store(&config).unwrap().name(), "in-memory");
    }

    #[test]
    fn key_selects_pinecone_without_network() {
        let config = Config {
            remote_api_key: Some("pc-key".into()),
            ..Config::default()
        };
        assert_eq!(select_store(&config).unwrap().name(), "pinecone");
    }

    #[tokio::test]
    async fn upsert_normalizes_and_counts() {
        let mut store = InMemoryStore::new();
        store.create_if_absent().await.unwrap();
        let n = store
            .upsert(vec![
                EmbeddedChunk {
                    chunk: chunk(0, "fever"),
                    embedding: vec![3.0, 4.0],
                },
                EmbeddedChunk {
                    chunk: chunk(1, "cough"),
                    embedding: vec![0.0, 0.0],
                },
            ])
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.len(), 2);
        let first = store.iter().next().unwrap();
        assert_eq!(first.embedding(), &[0.6, 0.8]);
        assert_eq!(store.iter().nth(1).unwrap().embedding(), &[0.0, 0.0]);
    }

    #[tokio::test]
    async fn same_chunk_twice_is_stored_once() {
        let mut store = InMemoryStore::new();
        for embedding in [vec![1.0, 0.0], vec![0.0, 1.0]] {
            store
                .upsert(vec![EmbeddedChunk {
                    chunk: chunk(0, "fever"),
                    embedding,
                }])
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 1);
        let id = chunk(0, "fever").id();
        assert_eq!(store.get(&id).unwrap().embedding(), &[0.0, 1.0]);
    }

    #[tokio::test]
    async fn mixed_dimensions_are_rejected() {
        let mut store = InMemoryStore::new();
        store
            .upsert(vec![EmbeddedChunk {
                chunk: chunk(0, "fever"),
                embedding: vec![1.0, 0.0, 0.0],
            }])
            .await
            .unwrap();
        let err = store
            .upsert(vec![EmbeddedChunk {
                chunk: chunk(1, "cough"),
                embedding: vec![1.0, 0.0],
            }])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { existing: 3, expected: 2, .. }
        ));
        assert_eq!(store.len(), 1);
    }
}
