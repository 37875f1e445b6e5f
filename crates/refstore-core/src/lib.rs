//! Refstore Core - scholarly metadata ingestion and sync engine
//!
//! This library maintains a local, embedded key-value mirror of a scholarly
//! works catalog, keyed by DOI, with:
//!
//! - Bulk loading from gzip-compressed snapshot segment files
//! - Incremental, cursor-paginated updates from the works web API
//! - Compressed record values with transparent legacy fallback
//! - A persisted watermark making update runs resumable

pub mod api;
pub mod codec;
pub mod config;
pub mod date;
pub mod error;
pub mod record;
pub mod source;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::{BulkConfig, CompressionLevel, OverwritePolicy, UpdateConfig};
pub use error::{ApiError, SourceError, StoreError};
pub use error::{Error, Result};
pub use record::Record;
pub use store::{Store, StoreReader};
pub use sync::{run_bulk, run_update, SyncReport};
