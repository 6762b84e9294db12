//! # Error Handling
//!
//! This module defines the error type for the `optimg` library.
//!
//! `OptimizeError` covers configuration problems and the failures that abort a
//! run before any image is touched. Per-image failures (a compressor that
//! crashes, a rename that is refused) never surface as an `OptimizeError`; the
//! optimizer turns them into an [`Outcome`](crate::optimizer::Outcome) and the
//! run moves on.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizeError {
    /// Another instance holds the run lock.
    #[error("another process is in progress (lock held on {0})")]
    AlreadyRunning(PathBuf),

    /// The configured external compressor does not exist.
    #[error("compressor not found in {0}")]
    CompressorNotFound(PathBuf),

    /// Malformed compressor argument template.
    #[error("invalid compressor arguments: {0}")]
    Template(String),

    /// Mode outside `0..=0o777` or not octal.
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid quality {0:?}, expected 1 to 100")]
    InvalidQuality(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The image root is missing or not a directory.
    #[error("image path {0} is not a directory")]
    RootNotFound(PathBuf),

    /// Marker store could not be loaded or persisted.
    #[error("marker store error: {0}")]
    Marker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = OptimizeError> = std::result::Result<T, E>;
