//! Batched transactional writer.
//!
//! Writes are staged into a pending batch that opens lazily on the first
//! insert and commits every `commit_frequency` staged writes. The watermark
//! entry is staged into the same batch as the record that advanced it, so its
//! durability exactly tracks batch durability: a crash can lose at most the
//! uncommitted tail, never a watermark that claims more than the visible
//! records support.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDateTime;
use fjall::PersistMode;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::{CompressionLevel, OverwritePolicy};
use crate::date;
use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::store::{Store, WATERMARK_KEY};

/// Commit retry budget for transient engine errors.
const MAX_COMMIT_ATTEMPTS: u32 = 20;

/// Backoff bounds between commit attempts.
const COMMIT_BACKOFF_BASE: Duration = Duration::from_secs(4);
const COMMIT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Counters accumulated over one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Records written (staged and eventually committed)
    pub written: u64,
    /// Records skipped because their key already existed under [`OverwritePolicy::Skip`]
    pub skipped_duplicate: u64,
    /// Records skipped because they carried no identifier
    pub skipped_missing_id: u64,
    /// Batches committed
    pub commits: u64,
}

/// Batched writer with watermark tracking.
///
/// Call [`Ingestor::finish`] when the stream is exhausted; dropping an
/// unfinished ingestor still attempts a final commit as a backstop for early
/// exits, but only `finish` reports the outcome.
pub struct Ingestor<'a> {
    store: &'a Store,
    policy: OverwritePolicy,
    level: CompressionLevel,
    commit_frequency: usize,
    /// Staged (key, value) writes of the currently open batch, in order.
    pending: Vec<(Vec<u8>, Vec<u8>)>,
    /// Identifiers staged in the open batch, for duplicate checks under skip
    /// policy before the batch is visible to the engine.
    staged_keys: HashSet<String>,
    /// Total writes staged over the whole run; commits fire on multiples of
    /// `commit_frequency`.
    write_count: usize,
    watermark: NaiveDateTime,
    stats: IngestStats,
    finished: bool,
}

impl<'a> Ingestor<'a> {
    pub(crate) fn new(
        store: &'a Store,
        policy: OverwritePolicy,
        level: CompressionLevel,
        commit_frequency: usize,
    ) -> Self {
        let watermark = match store.reader().most_recent_watermark_datetime() {
            Ok(watermark) => watermark,
            Err(_) => {
                info!("No watermark entry found in the store; starting from the floor");
                date::watermark_floor()
            }
        };

        Self {
            store,
            policy,
            level,
            commit_frequency: commit_frequency.max(1),
            pending: Vec::new(),
            staged_keys: HashSet::new(),
            write_count: 0,
            watermark,
            stats: IngestStats::default(),
            finished: false,
        }
    }

    /// The current in-memory watermark.
    pub fn watermark(&self) -> NaiveDateTime {
        self.watermark
    }

    /// Insert one record.
    ///
    /// A record without an identifier is skipped with a warning. Under skip
    /// policy an already-present identifier is a warned no-op; under replace
    /// policy the stored value is overwritten. When the record's indexed
    /// timestamp advances the watermark, the watermark entry is (re)staged
    /// into the open batch, once per qualifying record, not coalesced per
    /// commit; the final batch state is identical either way.
    pub fn insert(&mut self, record: &Record) -> Result<()> {
        let Some(doi) = record.doi().map(str::to_owned) else {
            warn!("No DOI found in item; skipping");
            self.stats.skipped_missing_id += 1;
            return Ok(());
        };

        if self.policy == OverwritePolicy::Skip && self.contains(&doi)? {
            warn!(%doi, "DOI already present; skipping");
            self.stats.skipped_duplicate += 1;
            return Ok(());
        }

        debug!(%doi, "Inserting record");

        let raw = record.to_minified_bytes()?;
        let value = codec::encode(&raw, self.level)?;
        self.stage(doi.clone().into_bytes(), value)?;
        self.staged_keys.insert(doi.clone());
        self.stats.written += 1;

        match date::indexed_datetime(record)? {
            None => warn!(%doi, "No indexed date for record"),
            Some(indexed) if indexed > self.watermark => {
                let formatted = date::format_watermark(indexed);
                let value = codec::encode(formatted.as_bytes(), self.level)?;
                self.stage(WATERMARK_KEY.as_bytes().to_vec(), value)?;
                self.watermark = indexed;
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Commit any open batch and return the run's counters.
    pub fn finish(mut self) -> Result<IngestStats> {
        if !self.pending.is_empty() {
            self.commit()?;
        }
        self.finished = true;
        Ok(self.stats)
    }

    fn contains(&self, doi: &str) -> Result<bool> {
        if self.staged_keys.contains(doi) {
            return Ok(true);
        }
        Ok(self.store.items().contains_key(doi).map_err(StoreError::from)?)
    }

    fn stage(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.pending.push((key, value));
        self.write_count += 1;

        if self.write_count % self.commit_frequency == 0 {
            self.commit()?;
        }

        Ok(())
    }

    /// Commit the pending batch, retrying transient engine errors with
    /// bounded exponential backoff. The engine guarantees per-commit
    /// atomicity, so a failed attempt leaves nothing behind and the batch is
    /// simply rebuilt for the next attempt.
    fn commit(&mut self) -> Result<()> {
        let used_bytes = self.store.keyspace().disk_space();
        let max_bytes = self.store.max_size_bytes();
        if used_bytes > max_bytes {
            return Err(StoreError::SizeLimitExceeded {
                used_bytes,
                max_bytes,
            }
            .into());
        }

        let mut attempt = 1;
        loop {
            match self.try_commit() {
                Ok(()) => {
                    self.stats.commits += 1;
                    debug!(
                        writes = self.pending.len(),
                        commits = self.stats.commits,
                        "Committed batch"
                    );
                    self.pending.clear();
                    self.staged_keys.clear();
                    return Ok(());
                }
                Err(err) if is_transient(&err) && attempt < MAX_COMMIT_ATTEMPTS => {
                    let delay = commit_backoff(attempt);
                    warn!(
                        error = %err,
                        attempt,
                        delay_s = delay.as_secs(),
                        "Transient commit failure; retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) if is_transient(&err) => {
                    return Err(StoreError::CommitRetriesExhausted {
                        attempts: attempt,
                        source: err,
                    }
                    .into());
                }
                Err(err) => return Err(StoreError::Engine(err).into()),
            }
        }
    }

    fn try_commit(&self) -> std::result::Result<(), fjall::Error> {
        let mut batch = self.store.keyspace().batch();
        for (key, value) in &self.pending {
            batch.insert(self.store.items(), key.as_slice(), value.as_slice());
        }
        batch.commit()?;
        self.store.keyspace().persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

impl Drop for Ingestor<'_> {
    fn drop(&mut self) {
        if self.finished || self.pending.is_empty() {
            return;
        }
        // final commit attempt on early-exit paths
        if let Err(err) = self.commit() {
            error!(error = %err, "Final commit failed while dropping ingestor");
        }
    }
}

/// Only I/O-rooted engine failures are worth retrying; anything else is a
/// logic or corruption problem and fails the run immediately.
fn is_transient(err: &fjall::Error) -> bool {
    matches!(err, fjall::Error::Io(_))
}

fn commit_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    COMMIT_BACKOFF_BASE
        .saturating_mul(1u32 << exp)
        .min(COMMIT_BACKOFF_MAX)
}
