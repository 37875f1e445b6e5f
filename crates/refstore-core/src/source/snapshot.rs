//! Bulk snapshot source: a directory of gzip-compressed JSON segments.
//!
//! Segment filenames encode an unpadded integer ordering key before the
//! `.json.gz` suffix; iteration is in ascending numeric order (0, 2, 9, 10,
//! never lexicographic). Resumption is file-grained: restarting mid-segment
//! reprocesses the whole segment, which is safe because the writer's
//! overwrite policy makes re-ingestion a no-op.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::source::{parse_items_batch, ItemSource};

const SEGMENT_SUFFIX: &str = ".json.gz";

/// Item source over a directory of `N.json.gz` segment files.
pub struct SnapshotSource {
    segments: Vec<(u64, PathBuf)>,
    next_index: usize,
    show_progress: bool,
}

impl SnapshotSource {
    /// Scan `data_dir` for segments, keeping those with a file number of at
    /// least `start_from_file_num`. Files without a numeric segment name are
    /// ignored.
    pub fn new(data_dir: &Path, start_from_file_num: u64, show_progress: bool) -> Result<Self> {
        let mut segments = Vec::new();

        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            let path = entry.path();

            let Some(file_num) = file_num_from_path(&path) else {
                continue;
            };

            if file_num < start_from_file_num {
                debug!(path = %path.display(), "Segment below resume threshold; skipping");
                continue;
            }

            segments.push((file_num, path));
        }

        segments.sort_unstable_by_key(|(file_num, _)| *file_num);

        info!(
            start_from_file_num,
            segments = segments.len(),
            "Starting bulk load"
        );

        Ok(Self {
            segments,
            next_index: 0,
            show_progress,
        })
    }

    /// The segment file numbers that will be processed, in order.
    pub fn file_nums(&self) -> impl Iterator<Item = u64> + '_ {
        self.segments.iter().map(|(file_num, _)| *file_num)
    }
}

/// The integer ordering key encoded in a segment filename, or `None` when the
/// name does not match `N.json.gz`.
fn file_num_from_path(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

impl ItemSource for SnapshotSource {
    fn estimate_total(&self) -> u64 {
        self.segments.len() as u64
    }

    fn unit(&self) -> &'static str {
        "segments"
    }

    fn show_progress(&self) -> bool {
        self.show_progress
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        let Some((file_num, path)) = self.segments.get(self.next_index) else {
            return Ok(None);
        };
        self.next_index += 1;

        debug!(file_num, path = %path.display(), "Reading segment");

        let read_err = |source| SourceError::SegmentRead {
            path: path.clone(),
            source,
        };

        let file = File::open(path).map_err(|e| read_err(e))?;
        let mut data = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut data)
            .map_err(|e| read_err(e))?;

        parse_items_batch(&data).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_segment(dir: &Path, name: &str, body: &str) {
        let file = File::create(dir.join(name)).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_file_num_parsing() {
        assert_eq!(file_num_from_path(Path::new("/data/0.json.gz")), Some(0));
        assert_eq!(file_num_from_path(Path::new("/data/10.json.gz")), Some(10));
        assert_eq!(file_num_from_path(Path::new("/data/readme.txt")), None);
        assert_eq!(file_num_from_path(Path::new("/data/x.json.gz")), None);
    }

    #[test]
    fn test_segments_iterate_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.json.gz", "0.json.gz", "9.json.gz", "2.json.gz"] {
            write_segment(dir.path(), name, r#"{"items": []}"#);
        }

        let source = SnapshotSource::new(dir.path(), 0, false).unwrap();
        let order: Vec<u64> = source.file_nums().collect();
        assert_eq!(order, [0, 2, 9, 10]);
    }

    #[test]
    fn test_resume_skips_earlier_segments() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "0.json.gz", r#"{"items": [{"DOI": "10.1/skipped"}]}"#);
        write_segment(dir.path(), "2.json.gz", r#"{"items": [{"DOI": "10.1/kept"}]}"#);

        let mut source = SnapshotSource::new(dir.path(), 1, false).unwrap();
        assert_eq!(source.file_nums().collect::<Vec<_>>(), [2]);
        assert_eq!(source.estimate_total(), 1);

        let batch = source.next_batch().unwrap().unwrap();
        assert_eq!(batch[0]["DOI"], "10.1/kept");
        assert!(source.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_malformed_segment_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "0.json.gz", r#"{"records": []}"#);

        let mut source = SnapshotSource::new(dir.path(), 0, false).unwrap();
        assert!(source.next_batch().is_err());
    }
}
