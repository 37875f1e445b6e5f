//! Error types for the refstore core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for refstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for refstore.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration validation failed; the message lists every problem found.
    #[error("{0}")]
    Config(String),

    /// Item-source error (segment files, batch shape)
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Store error (engine, lookup, value decoding)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Item-source errors.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Failed to read a snapshot segment file
    #[error("Failed to read segment {path}: {source}")]
    SegmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document did not have the expected shape
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A timestamp field was present but could not be parsed
    #[error("Unexpected date format in `{0}`")]
    InvalidTimestamp(String),
}

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Storage engine error
    #[error("Engine error: {0}")]
    Engine(#[from] fjall::Error),

    /// Key not present (or reserved and therefore never visible)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A stored value failed to parse after decoding
    #[error("Malformed value under key {key}: {source}")]
    MalformedValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The reserved watermark entry is absent
    #[error("No watermark entry present in the store")]
    WatermarkMissing,

    /// The store grew past the configured maximum size
    #[error("Store size {used_bytes} bytes exceeds the configured maximum of {max_bytes} bytes")]
    SizeLimitExceeded { used_bytes: u64, max_bytes: u64 },

    /// A batch commit kept failing with transient errors
    #[error("Commit failed after {attempts} attempts: {source}")]
    CommitRetriesExhausted {
        attempts: u32,
        #[source]
        source: fjall::Error,
    },
}

impl From<fjall::LsmError> for StoreError {
    fn from(source: fjall::LsmError) -> Self {
        StoreError::Engine(source.into())
    }
}

/// Remote API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-retryable HTTP status
    #[error("Request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// Transient failures persisted past the retry budget
    #[error("Request to {url} failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32, url: String },

    /// Response body did not have the expected shape
    #[error("Malformed API response: {0}")]
    MalformedResponse(String),
}
