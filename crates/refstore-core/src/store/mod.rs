//! Embedded record store.
//!
//! A single fjall partition holds every record keyed by its UTF-8 identifier,
//! plus a small set of reserved, double-underscore-prefixed bookkeeping keys
//! that the public read interface never exposes. The engine provides ordered
//! keys, crash-consistent batch commits, and snapshot-isolated reads; this
//! module only layers the record codec, the watermark, and the batching
//! policy on top.

mod ingest;
mod reader;

pub use ingest::{IngestStats, Ingestor};
pub use reader::StoreReader;

use std::path::Path;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};

use crate::config::{CompressionLevel, OverwritePolicy};
use crate::error::{Result, StoreError};

/// Reserved key holding the persisted watermark: the maximum indexed
/// timestamp observed across all ingested records.
pub const WATERMARK_KEY: &str = "__most_recent_indexed";

/// Prefix marking reserved bookkeeping keys.
pub const RESERVED_PREFIX: &str = "__";

const PARTITION_NAME: &str = "works";

/// Whether a key is reserved for internal bookkeeping.
pub(crate) fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Handle to an open store.
pub struct Store {
    keyspace: Keyspace,
    items: PartitionHandle,
    max_size_bytes: u64,
}

impl Store {
    /// Open (or create) the store under `db_dir`.
    ///
    /// `max_store_size_gb` bounds on-disk growth; the bound is enforced at
    /// commit time.
    pub fn open(db_dir: &Path, max_store_size_gb: f64) -> Result<Self> {
        let keyspace = fjall::Config::new(db_dir).open().map_err(StoreError::from)?;
        let items = keyspace
            .open_partition(PARTITION_NAME, PartitionCreateOptions::default())
            .map_err(StoreError::from)?;

        Ok(Self {
            keyspace,
            items,
            max_size_bytes: (max_store_size_gb * 1e9) as u64,
        })
    }

    /// A snapshot-isolated read view of the store as of now.
    pub fn reader(&self) -> StoreReader {
        StoreReader::new(self.items.snapshot())
    }

    /// A batched writer over this store.
    ///
    /// The initial watermark is loaded from a fresh read view, falling back
    /// to the far-past floor when no watermark entry exists yet.
    pub fn ingestor(
        &self,
        policy: OverwritePolicy,
        level: CompressionLevel,
        commit_frequency: usize,
    ) -> Ingestor<'_> {
        Ingestor::new(self, policy, level, commit_frequency)
    }

    /// Current on-disk footprint, in bytes.
    pub fn disk_space(&self) -> u64 {
        self.keyspace.disk_space()
    }

    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub(crate) fn items(&self) -> &PartitionHandle {
        &self.items
    }

    pub(crate) fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_key_predicate() {
        assert!(is_reserved(WATERMARK_KEY));
        assert!(is_reserved("__anything"));
        assert!(!is_reserved("10.1234/example"));
        assert!(!is_reserved("_single"));
    }

    #[test]
    fn test_open_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 1.0).unwrap();
        assert_eq!(store.reader().len().unwrap(), 0);
    }
}
