//! Read-only, map-like view over the store.
//!
//! Backed by an engine snapshot, so a reader observes a consistent state that
//! never includes a partially committed batch and is unaffected by writers
//! committing concurrently. Reserved bookkeeping keys are hidden from every
//! public operation, including direct lookups.

use chrono::NaiveDateTime;
use fjall::Snapshot;

use crate::codec;
use crate::date;
use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::store::{is_reserved, WATERMARK_KEY};

/// Snapshot-isolated reader.
pub struct StoreReader {
    snapshot: Snapshot,
}

impl StoreReader {
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Look up a record by identifier.
    ///
    /// Fails with `NotFound` when the key is absent or reserved: internal
    /// entries are never observable here, even when requested directly.
    pub fn get(&self, doi: &str) -> Result<Record> {
        if is_reserved(doi) {
            return Err(StoreError::NotFound(doi.to_string()).into());
        }

        let stored = self
            .snapshot
            .get(doi)
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::NotFound(doi.to_string()))?;

        decode_record(doi, &stored)
    }

    /// Number of visible (non-reserved) entries.
    pub fn len(&self) -> Result<u64> {
        let mut count = 0;
        for key in self.snapshot.keys() {
            let key = key.map_err(StoreError::from)?;
            if !is_reserved(&String::from_utf8_lossy(&key)) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate `(identifier, record)` pairs in store key order, skipping
    /// reserved keys. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = Result<(String, Record)>> + '_ {
        self.snapshot
            .iter()
            .filter_map(|entry| match entry {
                Ok((key, value)) => {
                    let key = String::from_utf8_lossy(&key).into_owned();
                    if is_reserved(&key) {
                        return None;
                    }
                    Some(decode_record(&key, &value).map(|record| (key, record)))
                }
                Err(err) => Some(Err(StoreError::from(err).into())),
            })
    }

    /// The persisted watermark string; fails when the entry is absent.
    pub fn most_recent_watermark(&self) -> Result<String> {
        let stored = self
            .snapshot
            .get(WATERMARK_KEY)
            .map_err(StoreError::from)?
            .ok_or(StoreError::WatermarkMissing)?;

        let decoded = codec::decode(&stored);
        String::from_utf8(decoded).map_err(|_| StoreError::WatermarkMissing.into())
    }

    /// The persisted watermark, parsed.
    pub fn most_recent_watermark_datetime(&self) -> Result<NaiveDateTime> {
        Ok(date::parse_watermark(&self.most_recent_watermark()?)?)
    }

    /// Recompute the watermark by scanning every visible record.
    ///
    /// Slower than reading the persisted entry; used to bootstrap or validate
    /// a store whose watermark entry is not trusted. `None` when no visible
    /// record carries an indexed timestamp.
    pub fn recompute_watermark_by_scan(&self) -> Result<Option<NaiveDateTime>> {
        let mut maximum: Option<NaiveDateTime> = None;

        for entry in self.iter() {
            let (_, record) = entry?;
            if let Some(indexed) = date::indexed_datetime(&record)? {
                maximum = Some(maximum.map_or(indexed, |current| current.max(indexed)));
            }
        }

        Ok(maximum)
    }
}

fn decode_record(key: &str, stored: &[u8]) -> Result<Record> {
    let raw = codec::decode(stored);
    Record::from_bytes(&raw)
        .map_err(|source| {
            StoreError::MalformedValue {
                key: key.to_string(),
                source,
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::{CompressionLevel, OverwritePolicy};
    use crate::store::Store;

    fn populated_store(dir: &tempfile::TempDir) -> Store {
        let store = Store::open(dir.path(), 1.0).unwrap();

        let mut ingestor = store.ingestor(OverwritePolicy::Skip, CompressionLevel::Default, 100);
        for (doi, stamp) in [
            ("10.1/b", "2024-03-01T00:00:00Z"),
            ("10.1/a", "2024-05-01T00:00:00Z"),
            ("10.1/c", "2024-04-01T00:00:00Z"),
        ] {
            ingestor
                .insert(
                    &Record::from_value(json!({"DOI": doi, "indexed": {"date-time": stamp}}))
                        .unwrap(),
                )
                .unwrap();
        }
        ingestor.finish().unwrap();

        store
    }

    #[test]
    fn test_get_hides_reserved_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(&dir);
        let reader = store.reader();

        assert!(reader.get("10.1/a").is_ok());
        assert!(matches!(
            reader.get(WATERMARK_KEY),
            Err(crate::Error::Store(StoreError::NotFound(_)))
        ));
        assert!(matches!(
            reader.get("10.1/absent"),
            Err(crate::Error::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_iter_is_key_ordered_and_skips_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(&dir);
        let reader = store.reader();

        let keys: Vec<String> = reader.iter().map(|entry| entry.unwrap().0).collect();
        assert_eq!(keys, ["10.1/a", "10.1/b", "10.1/c"]);

        // restartable: a second pass sees the same entries
        assert_eq!(reader.iter().count(), 3);
        assert_eq!(reader.len().unwrap(), 3);
    }

    #[test]
    fn test_snapshot_isolation_from_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(&dir);

        let before = store.reader();
        assert_eq!(before.len().unwrap(), 3);

        let mut ingestor = store.ingestor(OverwritePolicy::Replace, CompressionLevel::Default, 10);
        ingestor
            .insert(&Record::from_value(json!({"DOI": "10.1/new"})).unwrap())
            .unwrap();
        ingestor.finish().unwrap();

        // the earlier snapshot still sees the old state; a fresh one sees the write
        assert_eq!(before.len().unwrap(), 3);
        assert_eq!(store.reader().len().unwrap(), 4);
    }

    #[test]
    fn test_recompute_watermark_matches_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(&dir);
        let reader = store.reader();

        let scanned = reader.recompute_watermark_by_scan().unwrap().unwrap();
        assert_eq!(scanned, reader.most_recent_watermark_datetime().unwrap());
        assert_eq!(date::format_watermark(scanned), "2024-05-01T00:00:00");
    }

    #[test]
    fn test_recompute_watermark_on_undated_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 1.0).unwrap();

        let mut ingestor = store.ingestor(OverwritePolicy::Skip, CompressionLevel::Default, 10);
        ingestor
            .insert(&Record::from_value(json!({"DOI": "10.1/undated"})).unwrap())
            .unwrap();
        ingestor.finish().unwrap();

        assert_eq!(store.reader().recompute_watermark_by_scan().unwrap(), None);
    }

    #[test]
    fn test_legacy_uncompressed_value_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 1.0).unwrap();

        // a value written before compression was introduced
        store
            .items()
            .insert("10.1/legacy", br#"{"DOI": "10.1/legacy"}"#.as_slice())
            .unwrap();

        let record = store.reader().get("10.1/legacy").unwrap();
        assert_eq!(record.doi(), Some("10.1/legacy"));
    }

    #[test]
    fn test_malformed_value_fails_single_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = populated_store(&dir);

        store
            .items()
            .insert("10.1/broken", b"not json at all".as_slice())
            .unwrap();

        let reader = store.reader();
        assert!(matches!(
            reader.get("10.1/broken"),
            Err(crate::Error::Store(StoreError::MalformedValue { .. }))
        ));
        // other entries stay readable
        assert!(reader.get("10.1/a").is_ok());
    }
}
