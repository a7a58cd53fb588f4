//! Error types for the provision-dl library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during transfer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A local file was expected but is missing.
    #[error("File not found: {}", path.display())]
    NotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// Connection, DNS, timeout or HTTP status failure.
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered a ranged request with something other than 206.
    #[error(
        "Server does not support range requests for {url} (status {status}); \
         delete the local file and restart the download"
    )]
    ResumeUnsupported {
        /// URL the ranged request was sent to.
        url: String,
        /// Status the server answered with.
        status: u16,
    },

    /// Local disk failure while creating, writing or removing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local file does not match the expected length after a transfer error.
    #[error("Transfer incomplete: {} has {actual} of {expected} bytes", path.display())]
    Incomplete {
        /// Destination file.
        path: PathBuf,
        /// Bytes found on disk.
        actual: u64,
        /// Bytes the remote advertised.
        expected: u64,
    },

    /// The URL cannot be turned into a transfer target.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the caller has to delete the local file and restart.
    #[must_use]
    pub const fn is_resume_unsupported(&self) -> bool {
        matches!(self, Self::ResumeUnsupported { .. })
    }

    /// Returns true for failures on the network side of a transfer.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// A specialized `Result` type for provision-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
