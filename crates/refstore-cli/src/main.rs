//! Refstore CLI - scholarly metadata mirror tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use refstore_core::{CompressionLevel, Error};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Invalid arguments or configuration
    ConfigError = 1,
    /// Snapshot data could not be read or parsed
    SourceError = 2,
    /// Web API request failed after retries
    ApiError = 3,
    /// Store engine failure, size limit, or missing watermark
    StoreError = 4,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Map a failure to an exit code by inspecting the underlying error.
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<Error>() {
            Some(Error::Config(_)) => ExitCode::ConfigError,
            Some(Error::Source(_)) => ExitCode::SourceError,
            Some(Error::Api(_)) => ExitCode::ApiError,
            Some(Error::Store(_)) => ExitCode::StoreError,
            Some(Error::Io(_) | Error::Serialization(_)) | None => ExitCode::RuntimeError,
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "refstore")]
#[command(about = "Local DOI-keyed mirror of a scholarly works catalog", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk-load a snapshot directory into a new or existing store
    Create {
        /// Directory containing the N.json.gz snapshot segments
        #[arg(long)]
        data_dir: PathBuf,

        /// Directory holding the store
        #[arg(long)]
        db_dir: PathBuf,

        /// Skip segments with a file number below this value
        #[arg(long, default_value_t = 0)]
        start_from_file_num: u64,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Pull updates from the works web API
    Update {
        /// Directory holding the store
        #[arg(long)]
        db_dir: PathBuf,

        /// Contact email sent in the User-Agent header (polite pool)
        #[arg(long)]
        email: String,

        /// Lower bound on the indexed date, YYYY[-MM[-DD]]; defaults to the
        /// stored watermark
        #[arg(long)]
        from_date: Option<String>,

        /// Extra filter clause for the API query, e.g. type:journal-article
        #[arg(long)]
        filter: Option<String>,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Show store statistics
    Stats {
        /// Directory holding the store
        #[arg(long)]
        db_dir: PathBuf,
    },
}

/// Knobs shared by the create and update commands.
#[derive(clap::Args)]
struct TuningArgs {
    /// Maximum size the store may grow to, in GB
    #[arg(long, default_value_t = refstore_core::config::DEFAULT_MAX_STORE_SIZE_GB)]
    max_size_gb: f64,

    /// Compression level for stored values: -1 (default level) or 0-9
    #[arg(long, default_value_t = -1, allow_negative_numbers = true, value_parser = parse_compress_level_raw)]
    compress_level: i64,

    /// Number of staged writes between commits
    #[arg(long, default_value_t = refstore_core::config::DEFAULT_COMMIT_FREQUENCY)]
    commit_frequency: usize,

    /// Emit progress logs while running
    #[arg(long)]
    show_progress: bool,
}

impl TuningArgs {
    fn compression_level(&self) -> CompressionLevel {
        // the value parser has already bounds-checked the raw level
        CompressionLevel::from_numeric(self.compress_level).unwrap_or(CompressionLevel::Default)
    }
}

fn parse_compress_level_raw(raw: &str) -> Result<i64, String> {
    let level: i64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;

    match CompressionLevel::from_numeric(level) {
        Some(_) => Ok(level),
        None => Err(format!("`{raw}` is not a valid compression level (-1, 0-9)")),
    }
}

fn main() {
    let exit_code = run_cli();
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match execute_command(cli) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create {
            data_dir,
            db_dir,
            start_from_file_num,
            tuning,
        } => {
            commands::create::run(data_dir, db_dir, start_from_file_num, &tuning)?;
        }

        Commands::Update {
            db_dir,
            email,
            from_date,
            filter,
            tuning,
        } => {
            commands::update::run(db_dir, email, from_date, filter, &tuning)?;
        }

        Commands::Stats { db_dir } => {
            commands::stats::run(&db_dir)?;
        }
    }

    Ok(())
}
