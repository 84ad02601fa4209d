//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations that
//! share one boundary policy:
//!
//! - [`FixedSizeChunker`] - splits by character count with configurable overlap
//! - [`SeparatorChunker`] - like fixed-size, but pulls each chunk end back to the
//!   nearest paragraph, line, sentence or word boundary
//!
//! Sizes and overlaps count Unicode scalar values, not bytes. Every chunk after
//! the first starts exactly `chunk_overlap` characters before the previous chunk
//! ended, so dropping each chunk's overlap and concatenating the rest
//! reproduces the document (see [`reconstruct`](crate::document::reconstruct)).

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried by [`SeparatorChunker`], highest priority first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Lazily split a document into chunks.
    ///
    /// Yields nothing if the document has empty text.
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a>;

    /// Split a document into chunks eagerly.
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.chunks(document).collect()
    }
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `source` fields.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        Box::new(Chunks::new(document, self.chunk_size, self.chunk_overlap, &[]))
    }
}

/// Splits text at natural boundaries while keeping the fixed-size guarantees.
///
/// A chunk's end is pulled back to just after the last separator found in its
/// window, trying `"\n\n"`, `"\n"`, `". "` and `" "` in that order. Only
/// boundaries past `start + chunk_overlap` are eligible, so every chunk still
/// advances. When no separator qualifies the hard `chunk_size` limit is used.
#[derive(Debug, Clone)]
pub struct SeparatorChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl SeparatorChunker {
    /// Create a new `SeparatorChunker` using [`DEFAULT_SEPARATORS`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list (highest priority first). Empty separators are ignored.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators =
            separators.into_iter().map(Into::into).filter(|s: &String| !s.is_empty()).collect();
        self
    }
}

impl Chunker for SeparatorChunker {
    fn chunks<'a>(&'a self, document: &'a Document) -> Box<dyn Iterator<Item = Chunk> + 'a> {
        Box::new(Chunks::new(document, self.chunk_size, self.chunk_overlap, &self.separators))
    }
}

/// Lazy chunk iterator shared by the chunkers.
struct Chunks<'a> {
    document: &'a Document,
    /// Byte offset of every character, followed by the text length.
    offsets: Vec<usize>,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'a [String],
    start: usize,
    index: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn new(
        document: &'a Document,
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &'a [String],
    ) -> Self {
        let text = &document.text;
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        Self {
            document,
            done: text.is_empty(),
            offsets,
            chunk_size,
            chunk_overlap,
            separators,
            start: 0,
            index: 0,
        }
    }

    fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Character index just past the best separator in `(start + overlap, hard_end]`.
    fn break_point(&self, hard_end: usize) -> usize {
        let text = &self.document.text;
        let window_start = self.offsets[self.start];
        let window = &text[window_start..self.offsets[hard_end]];
        let min_end = self.start + self.chunk_overlap;

        for separator in self.separators {
            if let Some(pos) = window.rfind(separator.as_str()) {
                let byte_end = window_start + pos + separator.len();
                let char_end = self.offsets.binary_search(&byte_end).unwrap_or_else(|i| i);
                if char_end > min_end {
                    return char_end;
                }
            }
        }
        hard_end
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let total = self.char_count();
        let hard_end = (self.start + self.chunk_size).min(total);
        let end = if hard_end == total || self.separators.is_empty() {
            hard_end
        } else {
            self.break_point(hard_end)
        };

        let document = self.document;
        let text = &document.text[self.offsets[self.start]..self.offsets[end]];
        let overlap = if self.index == 0 { 0 } else { self.chunk_overlap };

        let mut metadata = document.metadata.clone();
        metadata.insert("chunk_index".to_string(), self.index.to_string());
        metadata.insert("source".to_string(), document.source.source.clone());

        let chunk = Chunk {
            id: format!("{}_{}", document.id, self.index),
            document_id: document.id.clone(),
            index: self.index,
            text: text.to_string(),
            start: self.start,
            end,
            overlap,
            metadata,
        };

        if end == total {
            self.done = true;
        } else {
            self.start = end - self.chunk_overlap;
        }
        self.index += 1;

        Some(chunk)
    }
}
