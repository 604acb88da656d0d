//! Splits document content into overlapping chunks for embedding.
//!
//! Windows are at most `chunk_size` characters. A window ends at the last paragraph
//! break inside it, else the last line break, sentence end or space, and only cuts
//! mid-word when none of those exist. The next window starts `chunk_overlap`
//! characters before the previous end, so every chunk is an exact substring of the
//! document and overlaps its neighbour by exactly `chunk_overlap` characters.

use sha2::{Digest, Sha256};

use crate::documents::{Document, Metadata};

/// Natural boundaries, strongest first. A window ends right after the separator.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A slice of a document's content, with the document's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
    /// Index of this chunk within the document (0, 1, 2, …).
    pub index: usize,
    /// Character offset of `text` in the document content.
    pub start: usize,
}

impl Chunk {
    /// Stable id derived from source, position and text. Re-indexing the same content
    /// produces the same ids, so remote upserts overwrite instead of duplicating.
    pub fn id(&self) -> String {
        let source = self
            .metadata
            .get(crate::documents::SOURCE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0]);
        hasher.update(self.index.to_le_bytes());
        hasher.update([0]);
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Length of `text` in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitError> {
        if chunk_size == 0 {
            return Err(SplitError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitError::OverlapTooLarge {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split one document. Empty content gives no chunks.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.page_content)
            .into_iter()
            .enumerate()
            .map(|(index, (start, text))| Chunk {
                text: text.to_string(),
                metadata: doc.metadata.clone(),
                index,
                start,
            })
            .collect()
    }

    /// Split all documents. Returns chunks from all documents in order.
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|d| self.split_document(d)).collect()
    }

    /// Returns `(char_offset, slice)` for every window of `text`.
    fn split_text<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        // bounds[i] is the byte offset of char i; the last entry is text.len().
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;
        let mut windows = Vec::new();
        let mut start = 0;
        while start < total {
            if total - start <= self.chunk_size {
                windows.push((start, &text[bounds[start]..]));
                break;
            }
            let end = self.window_end(text, &bounds, start);
            windows.push((start, &text[bounds[start]..bounds[end]]));
            start = end - self.chunk_overlap;
        }
        windows
    }

    /// End (exclusive, in chars) of the window starting at `start`.
    /// Always greater than `start + chunk_overlap`, which keeps the loop moving.
    fn window_end(&self, text: &str, bounds: &[usize], start: usize) -> usize {
        let limit = start + self.chunk_size;
        let min_end = start + self.chunk_overlap.max(self.chunk_size / 2);
        let window = &text[bounds[min_end]..bounds[limit]];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let byte_end = bounds[min_end] + pos + sep.len();
                // byte_end sits on a char boundary, so it is in `bounds`.
                if let Ok(end) = bounds.binary_search(&byte_end) {
                    return end;
                }
            }
        }
        limit
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("chunk size must be greater than 0")]
    ZeroChunkSize,
    #[error("chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}
