//! Item sources and the shared record pipeline.
//!
//! A source produces raw candidate batches; [`RecordStream`] applies the
//! validation and filtering that is common to every variant: candidates
//! without an identifier are dropped with a debug note, an optional injected
//! predicate may reject further candidates, and source order is preserved.

mod incremental;
mod snapshot;

pub use incremental::IncrementalSource;
pub use snapshot::SnapshotSource;

use std::collections::VecDeque;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::record::Record;

/// Caller-supplied record predicate. Must be pure; rejected records are
/// dropped before they reach the writer.
pub type RecordFilter = dyn Fn(&Record) -> bool;

/// A producer of candidate record batches.
pub trait ItemSource {
    /// Best-effort total number of batches, for progress reporting only.
    fn estimate_total(&self) -> u64;

    /// Progress label for one batch (`"segments"`, `"pages"`).
    fn unit(&self) -> &'static str;

    /// Whether progress should be reported while iterating.
    fn show_progress(&self) -> bool;

    /// The next candidate batch, in source order; `None` ends the stream.
    fn next_batch(&mut self) -> Result<Option<Vec<Value>>>;
}

/// Parse a raw batch document: a JSON object whose `items` field holds the
/// candidate array. Anything else is a fatal shape error.
pub fn parse_items_batch(data: &[u8]) -> Result<Vec<Value>> {
    let shape_err = || -> crate::Error { SourceError::MalformedInput("Invalid JSON".into()).into() };

    let document: Value = serde_json::from_slice(data).map_err(|_| shape_err())?;

    let Value::Object(mut document) = document else {
        return Err(shape_err());
    };

    match document.remove("items") {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(shape_err()),
    }
}

/// The validated, filtered, ordered record stream over a source.
pub struct RecordStream<'a, S: ItemSource> {
    source: S,
    filter: Option<&'a RecordFilter>,
    pending: VecDeque<Value>,
    batches_done: u64,
    filtered_out: u64,
    missing_id: u64,
}

impl<'a, S: ItemSource> RecordStream<'a, S> {
    pub fn new(source: S, filter: Option<&'a RecordFilter>) -> Self {
        Self {
            source,
            filter,
            pending: VecDeque::new(),
            batches_done: 0,
            filtered_out: 0,
            missing_id: 0,
        }
    }

    /// Candidates rejected by the injected predicate so far.
    pub fn filtered_out(&self) -> u64 {
        self.filtered_out
    }

    /// Candidates dropped for lacking an identifier so far.
    pub fn missing_id(&self) -> u64 {
        self.missing_id
    }

    fn refill(&mut self) -> Result<bool> {
        let Some(batch) = self.source.next_batch()? else {
            return Ok(false);
        };

        self.batches_done += 1;

        if self.source.show_progress() {
            info!(
                done = self.batches_done,
                total = self.source.estimate_total(),
                unit = self.source.unit(),
                "Progress"
            );
        }

        self.pending.extend(batch);
        Ok(true)
    }
}

impl<S: ItemSource> Iterator for RecordStream<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(candidate) = self.pending.pop_front() else {
                match self.refill() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(err) => return Some(Err(err)),
                }
            };

            let Some(record) = Record::from_value(candidate) else {
                return Some(Err(SourceError::MalformedInput("Invalid JSON".into()).into()));
            };

            if record.doi().is_none() {
                debug!(item = %truncated(&record), "Item does not have a DOI; skipping");
                self.missing_id += 1;
                continue;
            }

            if let Some(filter) = self.filter {
                if !filter(&record) {
                    debug!(item = %truncated(&record), "Filtered out item");
                    self.filtered_out += 1;
                    continue;
                }
            }

            return Some(Ok(record));
        }
    }
}

fn truncated(record: &Record) -> String {
    let mut rendered = record.as_value().to_string();
    if rendered.len() > 256 {
        rendered.truncate(256);
        rendered.push('…');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct VecSource {
        batches: VecDeque<Vec<Value>>,
    }

    impl VecSource {
        fn new(batches: Vec<Vec<Value>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    impl ItemSource for VecSource {
        fn estimate_total(&self) -> u64 {
            self.batches.len() as u64
        }

        fn unit(&self) -> &'static str {
            "batches"
        }

        fn show_progress(&self) -> bool {
            false
        }

        fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
            Ok(self.batches.pop_front())
        }
    }

    #[test]
    fn test_parse_items_batch() {
        let items = parse_items_batch(br#"{"items": [{"DOI": "10.1/a"}]}"#).unwrap();
        assert_eq!(items.len(), 1);

        assert!(parse_items_batch(br#"[1, 2, 3]"#).is_err());
        assert!(parse_items_batch(br#"{"records": []}"#).is_err());
        assert!(parse_items_batch(br#"{"items": {"a": 1}}"#).is_err());
        assert!(parse_items_batch(b"not json").is_err());
    }

    #[test]
    fn test_stream_drops_candidates_without_identifier() {
        let source = VecSource::new(vec![vec![
            json!({"DOI": "10.1/a"}),
            json!({"title": ["nameless"]}),
            json!({"DOI": "10.1/b"}),
        ]]);

        let mut stream = RecordStream::new(source, None);
        let dois: Vec<String> = stream
            .by_ref()
            .map(|record| record.unwrap().doi().unwrap().to_string())
            .collect();

        assert_eq!(dois, ["10.1/a", "10.1/b"]);
        assert_eq!(stream.missing_id(), 1);
    }

    #[test]
    fn test_stream_applies_predicate() {
        let source = VecSource::new(vec![
            vec![json!({"DOI": "10.1/keep"}), json!({"DOI": "10.1/drop"})],
            vec![json!({"DOI": "10.1/keep-too"})],
        ]);

        let keep_only = |record: &Record| !record.doi().unwrap_or_default().contains("drop");
        let mut stream = RecordStream::new(source, Some(&keep_only));

        let dois: Vec<String> = stream
            .by_ref()
            .map(|record| record.unwrap().doi().unwrap().to_string())
            .collect();

        assert_eq!(dois, ["10.1/keep", "10.1/keep-too"]);
        assert_eq!(stream.filtered_out(), 1);
    }

    #[test]
    fn test_stream_rejects_non_object_candidates() {
        let source = VecSource::new(vec![vec![json!({"DOI": "10.1/a"}), json!([1, 2])]]);
        let mut stream = RecordStream::new(source, None);

        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().unwrap().is_err());
    }
}
