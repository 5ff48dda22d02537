//! Error types for archive relocation operations.

use thiserror::Error;

/// Main error type for relocation operations.
///
/// Every pipeline stage reports through this type; the orchestrator never
/// downgrades one variant into another.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// The input could not be parsed as a valid archive.
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// A text-classified entry is not valid under the declared charset.
    #[error("Entry {path} is not valid {charset} text")]
    Decode {
        /// Path of the offending entry, as it appeared in the input archive
        path: String,
        /// Charset the entry was decoded with
        charset: &'static str,
    },

    /// An auxiliary entry could not be retrieved.
    #[error("Failed to fetch {locator}: {cause}")]
    FetchFailed {
        /// Locator of the auxiliary that failed
        locator: String,
        /// Underlying retrieval failure
        #[source]
        cause: FetchError,
    },

    /// The output archive could not be serialized.
    #[error("Failed to write archive: {0}")]
    WriteFailed(String),

    /// The rewrite rule is not a pair of valid directory prefixes.
    #[error("Invalid rewrite rule: {0}")]
    InvalidRule(String),

    /// The configuration is otherwise unusable (bad auxiliary name, etc.).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The declared uncompressed size of the input exceeds the limit.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Declared uncompressed size in bytes
        current: u64,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// An I/O error occurred outside the archive codec.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The transform was cancelled by the caller.
    #[error("Cancelled by user")]
    Cancelled,
}

/// Failures reported by a [`Fetch`](crate::fetch::Fetch) implementation.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No retrieval strategy exists for this URI scheme.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The remote server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local file retrieval failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The locator itself carries malformed inline data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The fetch task was aborted or panicked.
    #[error("fetch task failed: {0}")]
    Task(String),
}
