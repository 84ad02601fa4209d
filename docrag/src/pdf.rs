//! PDF loader backed by [`pdf_oxide`].
//!
//! This module is only available when the `pdf` feature is enabled.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use pdf_oxide::PdfDocument;
use tracing::{debug, info, warn};

use crate::document::{Document, DocumentFormat};
use crate::error::{RagError, Result};
use crate::loader::{DocumentLoader, detect_format, document_id, metadata_for};

const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Extracts the text of every page of a PDF, joining pages with a blank line.
///
/// Extraction is CPU bound and runs on the blocking pool under a timeout.
/// Pages without any text (scans, blank pages) are skipped but still counted
/// in the document's `page_count`.
#[derive(Debug, Clone)]
pub struct PdfLoader {
    extraction_timeout: Duration,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self { extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT }
    }
}

struct Pages {
    count: usize,
    /// Trimmed, non-empty page texts in page order.
    texts: Vec<String>,
    /// Zero-based indexes of pages whose text could not be extracted.
    failed: Vec<usize>,
}

fn collect_pages<E: std::fmt::Display>(
    count: usize,
    mut extract: impl FnMut(usize) -> std::result::Result<String, E>,
) -> Pages {
    let mut pages = Pages { count, texts: Vec::with_capacity(count), failed: Vec::new() };
    for page_index in 0..count {
        match extract(page_index) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pages.texts.push(text.to_string());
                }
            }
            Err(e) => {
                warn!(page = page_index + 1, error = %e, "skipping page with unreadable text");
                pages.failed.push(page_index);
            }
        }
    }
    pages
}

impl PdfLoader {
    /// Create a loader with the default 30 second extraction timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the extraction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    fn extract_pages(path: &Path) -> std::result::Result<Pages, String> {
        let mut doc =
            PdfDocument::open(path).map_err(|e| format!("failed to parse PDF: {e}"))?;
        let page_count = doc.page_count().map_err(|e| format!("failed to read page count: {e}"))?;
        Ok(collect_pages(page_count, |page_index| doc.extract_text(page_index)))
    }

    async fn extract(&self, name: &str, path: &Path) -> Result<Document> {
        let owned = path.to_path_buf();
        let Pages { count: page_count, texts: pages, failed } = tokio::time::timeout(
            self.extraction_timeout,
            tokio::task::spawn_blocking(move || Self::extract_pages(&owned)),
        )
        .await
        .map_err(|_| {
            RagError::parse(
                name,
                format!("text extraction timed out after {:?}", self.extraction_timeout),
            )
        })?
        .map_err(|e| RagError::parse(name, format!("extraction task failed: {e}")))?
        .map_err(|message| RagError::parse(name, message))?;

        if pages.is_empty() {
            return Err(RagError::parse(name, "no extractable text found"));
        }

        info!(
            source = name,
            page_count,
            text_pages = pages.len(),
            failed_pages = failed.len(),
            "PDF text extraction complete"
        );

        let mut metadata = metadata_for(name, DocumentFormat::Pdf);
        metadata.page_count = Some(page_count);
        let mut document = Document::new(document_id(name), pages.join("\n\n"), metadata)
            .with_metadata("page_count", page_count.to_string());
        if !failed.is_empty() {
            let list: Vec<String> = failed.iter().map(|i| (i + 1).to_string()).collect();
            document = document.with_metadata("unreadable_pages", list.join(","));
        }
        Ok(document)
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Pdf
    }

    async fn load_bytes(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        if detect_format(name)? != DocumentFormat::Pdf {
            return Err(RagError::UnsupportedFormat(format!("PDF loader cannot read '{name}'")));
        }

        let mut staged = tempfile::NamedTempFile::new()
            .map_err(|e| RagError::parse(name, format!("failed to create temp file: {e}")))?;
        staged
            .write_all(bytes)
            .map_err(|e| RagError::parse(name, format!("failed to write temp file: {e}")))?;
        debug!(source = name, bytes = bytes.len(), "staged PDF bytes");

        self.extract(name, staged.path()).await
    }

    async fn load_path(&self, path: &Path) -> Result<Document> {
        let name = path.display().to_string();
        if detect_format(&name)? != DocumentFormat::Pdf {
            return Err(RagError::UnsupportedFormat(format!("PDF loader cannot read '{name}'")));
        }
        if !path.exists() {
            return Err(RagError::parse(&name, "file not found"));
        }
        self.extract(&name, path).await
    }
}
