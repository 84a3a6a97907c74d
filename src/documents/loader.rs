//! Document Loading
//!
//! Extracts plain text from a staged PDF.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use ulid::Ulid;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unreadable document {0}: {1}")]
    Malformed(String, String),
    #[error("Document contains no extractable text: {0}")]
    NoText(String),
}

impl Serialize for LoaderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Text extracted from one document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedDocument {
    pub id: String,
    pub filename: String,
    pub text: String,
}

impl LoadedDocument {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// Turns a file on disk into text.
pub trait DocumentLoader: Send + Sync {
    /// `display_name` is what the user called the file; `path` is where its
    /// bytes currently are (usually a staged temp file).
    fn load(&self, path: &Path, display_name: &str) -> Result<LoadedDocument, LoaderError>;
}

/// PDF loader backed by `pdf-extract`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path, display_name: &str) -> Result<LoadedDocument, LoaderError> {
        let bytes = std::fs::read(path)?;

        // pdf-extract panics on some malformed inputs instead of returning Err
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes)));
        let raw = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(LoaderError::Malformed(display_name.to_string(), e.to_string())),
            Err(_) => {
                warn!(file = %display_name, "PDF parser panicked");
                return Err(LoaderError::Malformed(display_name.to_string(), "parser failure".to_string()));
            }
        };

        let text = normalize_text(&raw);
        if text.trim().is_empty() {
            return Err(LoaderError::NoText(display_name.to_string()));
        }

        debug!(file = %display_name, chars = text.len(), "Extracted PDF text");
        Ok(LoadedDocument::new(display_name, text))
    }
}

/// Extract the text of the PDF at `path`, named after its file name.
pub fn load_pdf(path: &Path) -> Result<LoadedDocument, LoaderError> {
    let name = path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    PdfLoader.load(path, &name)
}

/// Normalise extracted text: unify line endings, strip trailing spaces,
/// drop form feeds, and collapse runs of blank lines to one.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n").replace('\u{c}', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}
