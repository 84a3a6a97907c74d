//! Upload Intake
//!
//! Validates the single uploaded PDF and stages it on disk for the length
//! of one build action.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::debug;

/// The only accepted upload type
pub const ACCEPTED_EXTENSION: &str = "pdf";

/// Leading bytes of every PDF file
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Maximum upload size (50 MB)
pub const MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No file selected")]
    NoFile,
    #[error("Only one file can be processed at a time ({0} given)")]
    MultipleFiles(usize),
    #[error("Unsupported file type: {0} (only .pdf is accepted)")]
    UnsupportedType(String),
    #[error("File is empty: {0}")]
    EmptyFile(String),
    #[error("Not a PDF file: {0}")]
    NotPdf(String),
    #[error("File too large: {0} bytes (max {1} bytes)")]
    FileTooLarge(u64, u64),
}

impl Serialize for IntakeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// An uploaded file held in memory, already validated
#[derive(Clone)]
pub struct UploadedFile {
    name: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadedFile {
    /// Validate an in-memory upload.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, IntakeError> {
        let name = name.into();
        check_extension(Path::new(&name))?;

        let size = bytes.len() as u64;
        if size == 0 {
            return Err(IntakeError::EmptyFile(name));
        }
        if size > MAX_UPLOAD_SIZE {
            return Err(IntakeError::FileTooLarge(size, MAX_UPLOAD_SIZE));
        }
        if !bytes.starts_with(PDF_SIGNATURE) {
            return Err(IntakeError::NotPdf(name));
        }

        Ok(Self { name, bytes })
    }

    /// Read and validate a file from disk.
    ///
    /// Type and size are checked before the contents are read.
    pub fn from_path(path: &Path) -> Result<Self, IntakeError> {
        check_extension(path)?;

        let size = fs::metadata(path)?.len();
        if size > MAX_UPLOAD_SIZE {
            return Err(IntakeError::FileTooLarge(size, MAX_UPLOAD_SIZE));
        }

        let name = path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.pdf".to_string());
        Self::new(name, fs::read(path)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn check_extension(path: &Path) -> Result<(), IntakeError> {
    let extension = path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension == ACCEPTED_EXTENSION {
        Ok(())
    } else if extension.is_empty() {
        Err(IntakeError::UnsupportedType(path.display().to_string()))
    } else {
        Err(IntakeError::UnsupportedType(format!(".{}", extension)))
    }
}

/// Pick exactly one upload out of a selection.
pub fn select_upload(paths: &[PathBuf]) -> Result<UploadedFile, IntakeError> {
    match paths {
        [] => Err(IntakeError::NoFile),
        [path] => UploadedFile::from_path(path),
        many => Err(IntakeError::MultipleFiles(many.len())),
    }
}

/// An upload written to a transient file.
///
/// The file is removed when this value is dropped.
pub struct StagedDocument {
    file: NamedTempFile,
    original_name: String,
}

impl StagedDocument {
    /// Write `upload` into a fresh temp file inside `dir`.
    pub fn stage(upload: &UploadedFile, dir: &Path) -> Result<Self, IntakeError> {
        let mut file = Builder::new()
            .prefix("docchat-")
            .suffix(".pdf")
            .tempfile_in(dir)?;
        file.write_all(upload.bytes())?;
        file.flush()?;

        debug!(path = %file.path().display(), bytes = upload.len(), "Staged upload");
        Ok(Self {
            file,
            original_name: upload.name().to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }
}
