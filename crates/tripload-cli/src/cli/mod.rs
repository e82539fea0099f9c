//! CLI for the NYC taxi trip loader.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tripload_core::config;
use tripload_core::dataset::DatasetKind;
use tripload_core::locator::OriginLayout;
use tripload_core::warehouse::WriteDisposition;

use commands::{run_pipeline, run_plan};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tripload")]
#[command(about = "tripload: fetch NYC TLC trip files, stage them to GCS and load them into BigQuery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Which files a command works on.
#[derive(Debug, Clone, Args)]
pub struct DatasetArgs {
    /// Dataset kind: yellow or green.
    #[arg(long)]
    pub kind: DatasetKind,

    /// Calendar year of the files.
    #[arg(long)]
    pub year: u16,

    /// Months: a range ("1-6", "01-06") or a list ("1,2,3").
    #[arg(long, value_name = "EXPR")]
    pub months: String,

    /// Mirror to download from: datatalksclub (CSV) or tlc (Parquet).
    #[arg(long)]
    pub origin: Option<OriginLayout>,

    /// Object key prefix inside the bucket.
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub files: DatasetArgs,

    /// Destination GCS bucket.
    #[arg(long)]
    pub bucket: Option<String>,

    /// GCP project owning the bucket and the BigQuery dataset.
    #[arg(long)]
    pub project: Option<String>,

    /// BigQuery dataset.
    #[arg(long)]
    pub dataset: Option<String>,

    /// BigQuery location (e.g. US, EU).
    #[arg(long)]
    pub location: Option<String>,

    /// append, truncate or empty.
    #[arg(long)]
    pub write_disposition: Option<WriteDisposition>,

    /// Files retrieved and staged together before the next batch starts.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Where downloads land before upload (default: config or current dir).
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Upload only; skip dataset bootstrap and load jobs.
    #[arg(long)]
    pub stage_only: bool,

    /// Stage into a local directory instead of GCS.
    #[arg(long, requires = "stage_only")]
    pub store_dir: Option<PathBuf>,

    /// Attempt every load even after one fails (exit status is still non-zero).
    #[arg(long)]
    pub continue_on_load_error: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download, stage and load a range of monthly trip files.
    Run(RunArgs),

    /// Print origin URL, local file and object key for each month without transferring anything.
    Plan(DatasetArgs),
}

impl CliCommand {
    /// Parse arguments, run the command, and return the process exit status.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run(args) => run_pipeline(cfg, args).await,
            CliCommand::Plan(args) => {
                run_plan(&cfg, &args)?;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests;
