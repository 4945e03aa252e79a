//! Error types for annotation conversion and dataset management.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnotationError>;

/// Errors that can occur while reading, converting or reorganising datasets.
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to decode embedded image data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A file the operation depends on does not exist
    #[error("File not found: {path:?}")]
    FileNotFound { path: PathBuf },

    /// A directory the operation depends on does not exist
    #[error("Directory not found: {path:?}")]
    DirNotFound { path: PathBuf },

    /// Refusing to replace an existing file
    #[error("File already exists: {path:?} (use overwrite to replace it)")]
    AlreadyExists { path: PathBuf },

    /// Refusing to write into a populated directory
    #[error("Directory is not empty: {path:?} (use overwrite to clear it)")]
    DirNotEmpty { path: PathBuf },

    #[error("Label '{label}' does not exist in the provided categories {known:?}")]
    UnknownLabel { label: String, known: Vec<String> },

    #[error("Invalid shape type '{shape_type}', expected one of {expected:?}")]
    InvalidShapeType {
        shape_type: String,
        expected: &'static [&'static str],
    },

    #[error("At least one category is required for conversion to COCO format")]
    NoCategories,

    /// Keypoints that no polygon or rectangle contains
    #[error("Keypoints left unbounded in {image}: {labels:?}")]
    UnboundedKeypoints { image: String, labels: Vec<String> },

    #[error("No {kind} id mapping for dataset {dataset} and old id {old_id}")]
    MissingMapping {
        kind: &'static str,
        dataset: usize,
        old_id: u64,
    },

    #[error("No {kind} with id {id}")]
    RecordNotFound { kind: &'static str, id: u64 },

    #[error("Expected exactly one category named '{name}', found {count}")]
    AmbiguousName { name: String, count: usize },

    #[error("Length mismatch: {what} has {found} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Two images would be written to the same destination name
    #[error("Duplicate filename {file_name} in {dir:?}; use unique filenames or disable preserve_filenames")]
    DuplicateFilename { file_name: String, dir: PathBuf },

    #[error("Unsupported annotation format '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl AnnotationError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn dir_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DirNotFound { path: path.into() }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }
}
