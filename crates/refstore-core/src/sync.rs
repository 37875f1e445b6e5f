//! Sync orchestration: wire a source, the shared record pipeline, and the
//! store writer together into the two top-level operations.
//!
//! Bulk loads use skip policy so a rerun over already-ingested segments is a
//! no-op; incremental updates use replace policy because the remote copy is
//! newer by definition.

use std::time::Instant;

use tracing::{info, warn};

use crate::api::{CrossrefClient, WorksApi};
use crate::config::{BulkConfig, CompressionLevel, OverwritePolicy, UpdateConfig};
use crate::error::Result;
use crate::source::{IncrementalSource, ItemSource, RecordFilter, RecordStream, SnapshotSource};
use crate::store::Store;

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records written to the store
    pub written: u64,

    /// Records skipped because their identifier was already present
    pub skipped_duplicate: u64,

    /// Candidates dropped for lacking an identifier
    pub missing_id: u64,

    /// Candidates rejected by the caller-supplied predicate
    pub filtered_out: u64,

    /// Batches committed
    pub commits: u64,
}

/// Bulk-load a directory of snapshot segments into the store.
pub fn run_bulk(config: &BulkConfig, filter: Option<&RecordFilter>) -> Result<SyncReport> {
    config.validate()?;

    let store = Store::open(&config.db_dir, config.max_store_size_gb)?;
    let source = SnapshotSource::new(
        &config.data_dir,
        config.start_from_file_num,
        config.show_progress,
    )?;

    let started = Instant::now();
    let report = sync_source(
        &store,
        source,
        filter,
        OverwritePolicy::Skip,
        config.compression_level,
        config.commit_frequency,
    )?;

    info!(
        hours = format!("{:.4}", started.elapsed().as_secs_f64() / 3600.0),
        written = report.written,
        "Bulk load finished"
    );

    Ok(report)
}

/// Pull updates from the works web API into the store.
///
/// The lower bound on the indexed date comes from the configuration when set,
/// otherwise from the persisted watermark; a store with neither is an error.
pub fn run_update(config: &UpdateConfig, filter: Option<&RecordFilter>) -> Result<SyncReport> {
    config.validate()?;

    let mut api = CrossrefClient::new(&config.contact_email)?;
    api.discover_rate_limit();

    run_update_with_api(api, config, filter)
}

/// [`run_update`] against a caller-supplied API implementation. Configuration
/// must already be validated when bypassing [`run_update`].
pub fn run_update_with_api<A: WorksApi>(
    api: A,
    config: &UpdateConfig,
    filter: Option<&RecordFilter>,
) -> Result<SyncReport> {
    let store = Store::open(&config.db_dir, config.max_store_size_gb)?;

    let from_date = resolve_from_date(config, &store)?;
    info!(%from_date, "Updating from date");

    let source = IncrementalSource::new(
        api,
        from_date,
        config.filter_clause.clone(),
        config.show_progress,
    )?;

    let started = Instant::now();
    let report = sync_source(
        &store,
        source,
        filter,
        OverwritePolicy::Replace,
        config.compression_level,
        config.commit_frequency,
    )?;

    info!(
        hours = format!("{:.4}", started.elapsed().as_secs_f64() / 3600.0),
        written = report.written,
        "Update finished"
    );

    Ok(report)
}

/// An explicit from date wins; otherwise resume from the date portion of the
/// persisted watermark.
fn resolve_from_date(config: &UpdateConfig, store: &Store) -> Result<String> {
    if let Some(from_date) = &config.from_date {
        return Ok(from_date.clone());
    }

    let watermark = store.reader().most_recent_watermark_datetime()?;
    Ok(watermark.date().format("%Y-%m-%d").to_string())
}

fn sync_source<S: ItemSource>(
    store: &Store,
    source: S,
    filter: Option<&RecordFilter>,
    policy: OverwritePolicy,
    level: CompressionLevel,
    commit_frequency: usize,
) -> Result<SyncReport> {
    let mut stream = RecordStream::new(source, filter);
    let mut ingestor = store.ingestor(policy, level, commit_frequency);

    for record in stream.by_ref() {
        ingestor.insert(&record?)?;
    }

    let stats = ingestor.finish()?;

    if stats.skipped_duplicate > 0 {
        warn!(
            skipped = stats.skipped_duplicate,
            "Some identifiers were already present and left untouched"
        );
    }

    Ok(SyncReport {
        written: stats.written,
        skipped_duplicate: stats.skipped_duplicate,
        missing_id: stream.missing_id() + stats.skipped_missing_id,
        filtered_out: stream.filtered_out(),
        commits: stats.commits,
    })
}
