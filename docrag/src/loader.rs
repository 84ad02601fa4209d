//! Document loaders: turn files or byte streams into [`Document`]s.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::document::{Document, DocumentFormat, DocumentMetadata};
use crate::error::{RagError, Result};

/// Reads a source document and extracts its text.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Whether this loader can read documents of `format`.
    fn supports(&self, format: DocumentFormat) -> bool;

    /// Load a document from raw bytes. `name` is the file name or path the
    /// bytes came from and determines the format and document id.
    async fn load_bytes(&self, name: &str, bytes: &[u8]) -> Result<Document>;

    /// Load a document from the filesystem.
    ///
    /// The default implementation reads the whole file and delegates to
    /// [`load_bytes`](DocumentLoader::load_bytes).
    async fn load_path(&self, path: &Path) -> Result<Document> {
        let name = path.display().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::parse(&name, format!("failed to read file: {e}")))?;
        self.load_bytes(&name, &bytes).await
    }
}

/// Derive a stable document id from a file name: lowercase alphanumerics,
/// everything else replaced by `_`.
pub fn document_id(name: &str) -> String {
    file_name(name)
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// The final path component of `name`.
pub(crate) fn file_name(name: &str) -> &str {
    Path::new(name).file_name().and_then(|n| n.to_str()).unwrap_or(name)
}

/// Determine the document format from the extension of `name`.
///
/// # Errors
///
/// Returns [`RagError::UnsupportedFormat`] for missing or unknown extensions.
pub fn detect_format(name: &str) -> Result<DocumentFormat> {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| RagError::UnsupportedFormat(format!("'{name}' has no file extension")))?;
    DocumentFormat::from_extension(extension)
        .ok_or_else(|| RagError::UnsupportedFormat(format!("'.{extension}' files ('{name}')")))
}

pub(crate) fn metadata_for(name: &str, format: DocumentFormat) -> DocumentMetadata {
    DocumentMetadata {
        filename: file_name(name).to_string(),
        page_count: None,
        source: name.to_string(),
        format,
    }
}

/// Loads UTF-8 plain text and markdown files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl TextLoader {
    /// Create a new text loader.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text | DocumentFormat::Markdown)
    }

    async fn load_bytes(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        let format = detect_format(name)?;
        if !self.supports(format) {
            return Err(RagError::UnsupportedFormat(format!("text loader cannot read {format}")));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| RagError::parse(name, format!("invalid UTF-8: {e}")))?;

        debug!(source = name, chars = text.chars().count(), "loaded text document");
        Ok(Document::new(document_id(name), text, metadata_for(name, format)))
    }
}

/// Dispatches to the first registered loader that supports the file's format.
pub struct CompositeLoader {
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl CompositeLoader {
    /// Create a composite over the given loaders, tried in order.
    pub fn new(loaders: Vec<Arc<dyn DocumentLoader>>) -> Self {
        Self { loaders }
    }

    fn loader_for(&self, name: &str) -> Result<&Arc<dyn DocumentLoader>> {
        let format = detect_format(name)?;
        self.loaders
            .iter()
            .find(|l| l.supports(format))
            .ok_or_else(|| RagError::UnsupportedFormat(format!("no loader registered for {format}")))
    }
}

impl Default for CompositeLoader {
    /// Text and markdown, plus PDF when the `pdf` feature is enabled.
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut loaders: Vec<Arc<dyn DocumentLoader>> = vec![Arc::new(TextLoader)];
        #[cfg(feature = "pdf")]
        loaders.push(Arc::new(crate::pdf::PdfLoader::new()));
        Self::new(loaders)
    }
}

#[async_trait]
impl DocumentLoader for CompositeLoader {
    fn supports(&self, format: DocumentFormat) -> bool {
        self.loaders.iter().any(|l| l.supports(format))
    }

    async fn load_bytes(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        self.loader_for(name)?.load_bytes(name, bytes).await
    }

    async fn load_path(&self, path: &Path) -> Result<Document> {
        let name = path.display().to_string();
        let loader = self.loader_for(&name)?;
        let document = loader.load_path(path).await?;
        info!(
            document.id = %document.id,
            format = %document.source.format,
            page_count = document.source.page_count,
            "loaded document"
        );
        Ok(document)
    }
}
