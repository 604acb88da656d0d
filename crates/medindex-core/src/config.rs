//! Pipeline configuration: source folder, index name, splitter policy, service endpoints.
//!
//! Values come from an optional TOML file; credentials are layered on top from the
//! environment through [`Config::apply_env`], which takes the lookup as a function so
//! nothing in the library reads process-wide state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;

const CONFIG_FILENAME: &str = "config.toml";

/// Enables the Pinecone store when set.
pub const REMOTE_API_KEY_VAR: &str = "PINECONE_API_KEY";
/// Enables the Gemini embedder when set.
pub const EMBEDDING_API_KEY_VAR: &str = "GOOGLE_API_KEY";

pub const DEFAULT_SOURCE_DIR: &str = "data/";
pub const DEFAULT_INDEX_NAME: &str = "medical-chatbot";
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;
/// Output size of the MiniLM-L6 family of sentence embedders.
pub const DEFAULT_DIMENSION: usize = 384;

const MAX_INDEX_NAME_LEN: usize = 45;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pinecone API key. `None` selects the in-memory store.
    #[serde(skip_serializing)]
    pub remote_api_key: Option<String>,
    /// Google API key. `None` selects the local Ollama embedder.
    #[serde(skip_serializing)]
    pub embedding_api_key: Option<String>,
    /// Directory scanned for PDFs.
    pub source_dir: PathBuf,
    pub index_name: String,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of one document.
    pub chunk_overlap: usize,
    /// Embedding dimension; the remote index is created with it.
    pub dimension: usize,
    pub pinecone: PineconeConfig,
    pub ollama: OllamaConfig,
    pub gemini: GeminiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_api_key: None,
            embedding_api_key: None,
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            dimension: DEFAULT_DIMENSION,
            pinecone: PineconeConfig::default(),
            ollama: OllamaConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

/// Pinecone control plane and serverless placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeConfig {
    pub control_url: String,
    pub api_version: String,
    pub cloud: String,
    pub region: String,
    /// Vectors per upsert request.
    pub upsert_batch_size: usize,
    /// Delay between readiness checks after creating an index.
    pub ready_poll_ms: u64,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            control_url: "https://api.pinecone.io".to_string(),
            api_version: "2025-01".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
            ready_poll_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: crate::ollama::DEFAULT_BASE_URL.to_string(),
            model: crate::ollama::DEFAULT_EMBED_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: crate::gemini::DEFAULT_BASE_URL.to_string(),
            model: crate::gemini::DEFAULT_EMBED_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Fill credentials from `lookup` (usually `std::env::var(..).ok()`).
    /// Empty values count as unset; a set value replaces whatever the file had.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = non_empty(lookup(REMOTE_API_KEY_VAR)) {
            self.remote_api_key = Some(key);
        }
        if let Some(key) = non_empty(lookup(EMBEDDING_API_KEY_VAR)) {
            self.embedding_api_key = Some(key);
        }
    }

    /// The Pinecone key, if one is configured and not blank.
    pub fn remote_api_key(&self) -> Option<&str> {
        self.remote_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// The Google key, if one is configured and not blank.
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.dimension == 0 {
            return Err(ConfigError::Invalid("dimension must be greater than 0".into()));
        }
        if !is_valid_index_name(&self.index_name) {
            return Err(ConfigError::Invalid(format!(
                "index name {:?} must be 1-{} lowercase letters, digits or '-'",
                self.index_name, MAX_INDEX_NAME_LEN
            )));
        }
        Ok(())
    }
}

/// Load config from `path`, or from `config.toml` in the app data directory when no
/// path is given. A missing default file yields the default config; an explicit path
/// must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let Some(data_dir) = app_data::app_data_dir() else {
                return Ok(Config::default());
            };
            let candidate = data_dir.join(CONFIG_FILENAME);
            if !candidate.is_file() {
                return Ok(Config::default());
            }
            candidate
        }
    };
    let s = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config, ConfigError> {
    toml::from_str(s).map_err(ConfigError::Parse)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_valid_index_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_INDEX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
