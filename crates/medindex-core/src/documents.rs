//! Documents produced by the loader and the filter that trims their metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata carried by documents and chunks. Ordered so output is deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key holding the source file path.
pub const SOURCE_KEY: &str = "source";

/// One loaded source file: its extracted text and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// The `source` path, if set and a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
    }
}

/// Strip every document down to its content and `source`. Content is untouched.
pub fn minimal_docs(docs: Vec<Document>) -> Vec<Document> {
    docs.into_iter()
        .map(|doc| {
            let metadata = doc
                .metadata
                .into_iter()
                .filter(|(k, _)| k == SOURCE_KEY)
                .collect();
            Document {
                page_content: doc.page_content,
                metadata,
            }
        })
        .collect()
}
