//! Error types shared across the extraction/storage/analysis pipeline.
//!
//! Four kinds, matching the failure surfaces a client can hit:
//! bad uploads, PDF extraction problems, filesystem trouble, and
//! upstream AI failures. All of them render as a single human-readable
//! message; the HTTP layer picks the status code per kind.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Wrong content type, missing file field, malformed form data.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// Unreadable/corrupt PDF, invalid page-skip range, empty result.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Filesystem read/write errors in the upload store.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// External AI service failure, or nothing to analyze.
    #[error("analysis failed: {0}")]
    Analysis(String),
}

impl Error {
    /// True when the underlying cause is a missing file (the analyze
    /// endpoint turns this into a 404 rather than a 500).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
