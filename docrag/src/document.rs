//! Data types for documents, chunks, embedding records and answers.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The source format a [`Document`] was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// UTF-8 plain text.
    Text,
    /// UTF-8 markdown.
    Markdown,
}

impl DocumentFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Text => write!(f, "text"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}

/// Where a [`Document`] came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    /// File name of the source, without directories.
    pub filename: String,
    /// Number of pages, when the format has pages.
    pub page_count: Option<usize>,
    /// Full path or caller-supplied name of the source.
    pub source: String,
    /// Source format.
    pub format: DocumentFormat,
}

/// A loaded source document. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The extracted text content of the document.
    pub text: String,
    /// Source metadata.
    pub source: DocumentMetadata,
    /// Additional key-value metadata copied onto every chunk.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document from already-extracted text.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source: DocumentMetadata,
    ) -> Self {
        Self { id: id.into(), text: text.into(), source, metadata: HashMap::new() }
    }

    /// Attach a metadata entry that every chunk will inherit.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous segment of a [`Document`].
///
/// `start` and `end` are character offsets into the document text. The first
/// `overlap` characters repeat the tail of the previous chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of the chunk within its document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    /// Number of leading characters shared with the previous chunk.
    pub overlap: usize,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// The part of the chunk not already covered by its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// Rebuild the source text from its chunks by dropping each chunk's overlap.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::fresh_text).collect()
}

/// A chunk's vector as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// The chunk identifier.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The embedding vector. May be empty on records returned by a search.
    pub vector: Vec<f32>,
    /// The chunk text.
    pub text: String,
    /// Metadata carried over from the chunk.
    pub metadata: HashMap<String, String>,
}

impl EmbeddingRecord {
    /// Create a record without metadata.
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        vector: Vec<f32>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            vector,
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    /// Pair a chunk with its embedding.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            vector,
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        }
    }
}

/// A retrieved [`EmbeddingRecord`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved record.
    pub record: EmbeddingRecord,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// The ranked outcome of one retrieval call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The query text that was searched for.
    pub query: String,
    /// Matches ordered by descending score.
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Create an empty result for `query`.
    pub fn empty(query: impl Into<String>) -> Self {
        Self { query: query.into(), chunks: Vec::new() }
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of retrieved chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// The identifiers of the retrieved chunks as an ordered set.
    pub fn chunk_ids(&self) -> BTreeSet<String> {
        self.chunks.iter().map(|c| c.record.id.clone()).collect()
    }
}

/// A generated answer and the context it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The generated text.
    pub text: String,
    /// The retrieved chunks used as context, for citation.
    pub sources: Vec<ScoredChunk>,
    /// Whether the text was served from the response cache.
    pub from_cache: bool,
    /// False when no context was available and the fallback text was returned.
    pub grounded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, overlap: usize) -> Chunk {
        Chunk {
            id: "d_0".into(),
            document_id: "d".into(),
            index: 0,
            text: text.into(),
            start: 0,
            end: text.chars().count(),
            overlap,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn fresh_text_skips_overlap_by_characters() {
        assert_eq!(chunk("héllo", 2).fresh_text(), "llo");
        assert_eq!(chunk("abc", 0).fresh_text(), "abc");
        assert_eq!(chunk("abc", 3).fresh_text(), "");
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("md"), Some(DocumentFormat::Markdown));
        assert_eq!(DocumentFormat::from_extension("docx"), None);
    }
}
