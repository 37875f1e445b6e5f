//! Update command implementation.

use std::path::PathBuf;

use anyhow::Result;
use refstore_core::{run_update, UpdateConfig};
use tracing::info;

use crate::TuningArgs;

/// Pull updates from the works web API into the store.
pub fn run(
    db_dir: PathBuf,
    email: String,
    from_date: Option<String>,
    filter_clause: Option<String>,
    tuning: &TuningArgs,
) -> Result<()> {
    let config = UpdateConfig {
        db_dir,
        contact_email: email,
        from_date,
        filter_clause,
        max_store_size_gb: tuning.max_size_gb,
        compression_level: tuning.compression_level(),
        commit_frequency: tuning.commit_frequency,
        show_progress: tuning.show_progress,
    };

    let report = run_update(&config, None)?;

    info!(
        written = report.written,
        missing_id = report.missing_id,
        commits = report.commits,
        "Update complete"
    );

    Ok(())
}
