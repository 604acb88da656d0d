//! Embedding providers: text in, fixed-dimension vectors out.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::gemini::GeminiEmbedder;
use crate::ollama::OllamaEmbedder;

/// Maps texts to vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Gemini when a Google API key is configured, otherwise the local Ollama server.
pub fn select_embedder(config: &Config) -> Result<Box<dyn Embedder>, EmbedError> {
    match config.embedding_api_key() {
        Some(key) => {
            tracing::info!(model = %config.gemini.model, "using Gemini embeddings");
            Ok(Box::new(GeminiEmbedder::new(
                key,
                &config.gemini.base_url,
                &config.gemini.model,
                config.dimension,
            )?))
        }
        None => {
            tracing::info!(model = %config.ollama.model, url = %config.ollama.base_url, "using Ollama embeddings");
            Ok(Box::new(
                OllamaEmbedder::from_url(&config.ollama.base_url)?
                    .with_embed_model(&config.ollama.model),
            ))
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embedding service URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Ollama(#[from] ollama_rs::error::OllamaError),
    #[error("invalid API key header value")]
    InvalidApiKey,
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("embedding service returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}
