//! Configuration for bulk loads and incremental updates.
//!
//! All values arrive via CLI flags; validation runs eagerly, before any I/O,
//! and reports every problem found in a single error.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Default number of staged writes between commits.
pub const DEFAULT_COMMIT_FREQUENCY: usize = 1_000;

/// Default maximum store size, in GB.
pub const DEFAULT_MAX_STORE_SIZE_GB: f64 = 2_000.0;

/// Compression level for stored record values.
///
/// `Default` is the zlib default (level 6); explicit levels range from 0
/// (no compression) to 9 (best compression).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Default,
    Level(u32),
}

impl CompressionLevel {
    /// Parse a numeric level as accepted on the command line, where `-1`
    /// selects the default level.
    pub fn from_numeric(level: i64) -> Option<Self> {
        match level {
            -1 => Some(Self::Default),
            0..=9 => Some(Self::Level(level as u32)),
            _ => None,
        }
    }

    pub(crate) fn to_flate2(self) -> flate2::Compression {
        match self {
            Self::Default => flate2::Compression::default(),
            Self::Level(level) => flate2::Compression::new(level),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Level(level) => write!(f, "{level}"),
        }
    }
}

/// What to do when an insert hits an already-present identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leave the existing value in place and warn. Used by bulk loads, where
    /// re-running over already-ingested segments must be a no-op.
    Skip,
    /// Unconditionally replace the existing value. Used by incremental
    /// updates, where the remote copy is newer by definition.
    Replace,
}

/// Configuration for a bulk load from a directory of snapshot segments.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Directory containing the `N.json.gz` segment files
    pub data_dir: PathBuf,

    /// Directory holding the store
    pub db_dir: PathBuf,

    /// Maximum size the store may grow to, in GB
    pub max_store_size_gb: f64,

    /// Compression level for stored values
    pub compression_level: CompressionLevel,

    /// Number of staged writes between commits
    pub commit_frequency: usize,

    /// Skip all segments with a file number below this value
    pub start_from_file_num: u64,

    /// Emit per-segment progress logs
    pub show_progress: bool,
}

impl BulkConfig {
    /// Validate the configuration, collecting every problem into one report.
    pub fn validate(&self) -> Result<()> {
        let mut errors = validate_common(&self.db_dir, self.max_store_size_gb, self.commit_frequency);

        if !self.data_dir.is_dir() {
            errors.push(format!(
                "Data directory ({}) does not exist or is not a directory",
                self.data_dir.display()
            ));
        } else if !self.data_dir.join("0.json.gz").exists() {
            errors.push(format!(
                "Data directory ({}) does not contain the expected snapshot data",
                self.data_dir.display()
            ));
        }

        finish_validation(errors)
    }
}

/// Configuration for an incremental update from the works web API.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Directory holding the store
    pub db_dir: PathBuf,

    /// Contact email sent in the `User-Agent` header (polite pool)
    pub contact_email: String,

    /// Lower bound on the indexed date, `YYYY[-MM[-DD]]`. When absent, the
    /// persisted watermark supplies the resume point.
    pub from_date: Option<String>,

    /// Extra filter clause appended to the API query, e.g.
    /// `type:journal-article`
    pub filter_clause: Option<String>,

    /// Maximum size the store may grow to, in GB
    pub max_store_size_gb: f64,

    /// Compression level for stored values
    pub compression_level: CompressionLevel,

    /// Number of staged writes between commits
    pub commit_frequency: usize,

    /// Emit per-page progress logs
    pub show_progress: bool,
}

impl UpdateConfig {
    /// Validate the configuration, collecting every problem into one report.
    pub fn validate(&self) -> Result<()> {
        let mut errors = validate_common(&self.db_dir, self.max_store_size_gb, self.commit_frequency);

        if !is_plausible_email(&self.contact_email) {
            errors.push(format!(
                "Contact email address (`{}`) is not valid",
                self.contact_email
            ));
        }

        if let Some(from_date) = &self.from_date {
            if !is_valid_from_date(from_date) {
                errors.push(format!("From date `{from_date}` is not in a valid format"));
            }
        }

        finish_validation(errors)
    }
}

fn validate_common(db_dir: &std::path::Path, max_size_gb: f64, commit_frequency: usize) -> Vec<String> {
    let mut errors = Vec::new();

    if !db_dir.exists() {
        errors.push(format!("Database directory ({}) does not exist", db_dir.display()));
    }

    if max_size_gb <= 0.0 {
        errors.push(format!("Invalid maximum store size ({max_size_gb})"));
    }

    if commit_frequency == 0 {
        errors.push("Invalid commit frequency (0)".to_string());
    }

    errors
}

fn finish_validation(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }

    let report = std::iter::once("Encountered the following errors with the provided arguments:".to_string())
        .chain(errors.into_iter().map(|error| format!("\t{error}")))
        .collect::<Vec<_>>()
        .join("\n");

    Err(Error::Config(report))
}

/// Accepts `YYYY`, `YYYY-MM`, and `YYYY-MM-DD`.
fn is_valid_from_date(value: &str) -> bool {
    match value.split('-').count() {
        1 => NaiveDate::parse_from_str(&format!("{value}-1-1"), "%Y-%m-%d").is_ok(),
        2 => NaiveDate::parse_from_str(&format!("{value}-1"), "%Y-%m-%d").is_ok(),
        3 => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}

// Enough to catch flag typos; real deliverability checks are not our problem.
fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
