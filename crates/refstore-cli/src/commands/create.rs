//! Create command implementation.

use std::path::PathBuf;

use anyhow::Result;
use refstore_core::{run_bulk, BulkConfig};
use tracing::info;

use crate::TuningArgs;

/// Bulk-load a snapshot directory into the store.
pub fn run(
    data_dir: PathBuf,
    db_dir: PathBuf,
    start_from_file_num: u64,
    tuning: &TuningArgs,
) -> Result<()> {
    let config = BulkConfig {
        data_dir,
        db_dir,
        max_store_size_gb: tuning.max_size_gb,
        compression_level: tuning.compression_level(),
        commit_frequency: tuning.commit_frequency,
        start_from_file_num,
        show_progress: tuning.show_progress,
    };

    let report = run_bulk(&config, None)?;

    info!(
        written = report.written,
        skipped_duplicate = report.skipped_duplicate,
        missing_id = report.missing_id,
        commits = report.commits,
        "Bulk load complete"
    );

    Ok(())
}
