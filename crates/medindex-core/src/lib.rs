//! Indexing backend for the medical chatbot, independent of how it is run.
//!
//! PDFs are loaded from a source folder, split into overlapping chunks, embedded and
//! upserted into a Pinecone index, or into an in-memory store when no Pinecone key is
//! configured (see [store::select_store]).

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod gemini;
pub mod index;
pub mod ollama;
pub mod pdfs;
pub mod pinecone;
pub mod store;

pub use app_data::app_data_dir;
pub use chunks::{Chunk, SplitError, TextSplitter};
pub use config::{load_config, Config, ConfigError};
pub use documents::{minimal_docs, Document, Metadata};
pub use embeddings::{select_embedder, EmbedError, Embedder};
pub use index::{build_index, load_chunks, IndexError, IndexReport};
pub use pdfs::{load_pdf_dir, LoadError};
pub use store::{select_store, EmbeddedChunk, InMemoryStore, StoreError, VectorStore};
