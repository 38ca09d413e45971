//! Outcome of one ingestion cycle.

use std::path::PathBuf;

use genpic_core::fs_guard::FsError;
use genpic_core::image_probe::ProbeError;
use genpic_core::types::DbId;

/// Failure that aborts a whole cycle. Only enumerating the watched
/// directory can fail this way; everything else is per file.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to enumerate {}: {source}", dir.display())]
    Enumerate {
        dir: PathBuf,
        source: std::io::Error,
    },
}

/// Why a single file was skipped.
///
/// None of these are retried within the cycle. A file whose insert failed
/// (`StorageFailure`) has no picture row, so the next cycle picks it up
/// again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestFailure {
    #[error("not a regular file")]
    NotAFile,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("no generation task matches this file")]
    OrphanFile,

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl IngestFailure {
    /// Stable snake_case name for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAFile => "not_a_file",
            Self::InvalidImage(_) => "invalid_image",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::OrphanFile => "orphan_file",
            Self::StorageFailure(_) => "storage_failure",
            Self::Io(_) => "io",
        }
    }
}

impl From<ProbeError> for IngestFailure {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::InvalidImage(msg) => Self::InvalidImage(msg),
            ProbeError::UnsupportedFormat(msg) => Self::UnsupportedFormat(msg),
        }
    }
}

impl From<FsError> for IngestFailure {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotAFile(_) => Self::NotAFile,
            FsError::Io(e) => Self::Io(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for IngestFailure {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageFailure(err.to_string())
    }
}

/// A file that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file_name: String,
    pub failure: IngestFailure,
}

/// A file that produced a new picture row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub file_name: String,
    pub picture_id: DbId,
}

/// Everything one cycle did, each list in file-name order.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub inserted: Vec<IngestedFile>,
    /// Already represented by a picture row.
    pub already_ingested: Vec<String>,
    /// Listed by the directory scan but gone by the time it was checked.
    pub vanished: Vec<String>,
    /// Resolved (through symlinks) to somewhere outside the watched root.
    pub outside_root: Vec<String>,
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    /// The failure recorded for `file_name`, if any.
    pub fn failure_for(&self, file_name: &str) -> Option<&IngestFailure> {
        self.failures
            .iter()
            .find(|f| f.file_name == file_name)
            .map(|f| &f.failure)
    }

    /// Names of inserted files, in insertion order.
    pub fn inserted_names(&self) -> Vec<&str> {
        self.inserted.iter().map(|f| f.file_name.as_str()).collect()
    }
}
