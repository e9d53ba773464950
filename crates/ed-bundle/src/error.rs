//! Error types for bundle operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during bundle operations.
#[derive(Error, Debug)]
pub enum BundleError {
    /// The bundle directory is already present on disk.
    ///
    /// Bundles are never merged into a leftover directory; a second run in
    /// the same second collides here.
    #[error("incident bundle already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// I/O error creating or writing part of the bundle
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Manifest written by an incompatible version
    #[error("unsupported manifest schema version: {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    /// Manifest content is structurally wrong
    #[error("corrupted manifest: {0}")]
    CorruptedManifest(String),
}

impl BundleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
