//! Error types for the blockship library
//!
//! This module defines all error types that can occur during shipping
//! operations. Errors are designed to be informative, providing clear context
//! about which block, file, or remote object a failure concerns.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the blockship library
pub type Result<T> = std::result::Result<T, ShipperError>;

/// Main error type for all shipping operations
#[derive(Debug, Error)]
pub enum ShipperError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory name or manifest field is not a valid block identifier
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),

    /// Manifest file carries an unsupported version number
    #[error("unsupported manifest version {found} in {path:?}")]
    ManifestVersion {
        /// Version number found in the file
        found: u32,
        /// Path of the offending manifest
        path: PathBuf,
    },

    /// Bookkeeping file does not exist yet
    #[error("bookkeeping file not found at {0:?}")]
    MetaNotFound(PathBuf),

    /// Bookkeeping file carries an unsupported version number
    #[error("unsupported bookkeeping version {found}")]
    MetaVersion {
        /// Version number found in the file
        found: u32,
    },

    /// Remote object store operation failed
    #[error("remote store error: {0}")]
    Remote(String),

    /// Hard-linking a block file into the staging directory failed
    ///
    /// Hard links cannot cross filesystem boundaries; co-locating the block
    /// root and staging namespace on one filesystem is an operational
    /// precondition.
    #[error("hard link {file:?}: {source}")]
    HardLink {
        /// Relative path of the file being linked
        file: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Operation aborted by a cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Generic error for unexpected conditions
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShipperError {
    /// Create a remote store error with a custom message
    pub fn remote(msg: impl Into<String>) -> Self {
        ShipperError::Remote(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        ShipperError::Internal(msg.into())
    }

    /// Check if this error represents a missing file or object
    pub fn is_not_found(&self) -> bool {
        match self {
            ShipperError::MetaNotFound(_) => true,
            ShipperError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
