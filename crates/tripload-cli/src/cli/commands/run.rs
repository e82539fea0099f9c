//! `tripload run`: bootstrap, retrieve, stage and load.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tripload_core::config::TriploadConfig;
use tripload_core::error::PipelineError;
use tripload_core::http::ApiClient;
use tripload_core::loader::LoadFailurePolicy;
use tripload_core::pipeline::{self, Destination, Pipeline, PipelineSettings, RunReport};
use tripload_core::progress::ProgressEvent;
use tripload_core::retrieval::{CurlOrigin, Origin};
use tripload_core::store::{GcsStore, LocalStore};
use tripload_core::warehouse::BigQueryWarehouse;

use super::apply_dataset_overrides;
use crate::cli::RunArgs;

/// Container name used with `--store-dir` when no bucket is configured.
const LOCAL_CONTAINER: &str = "tripload";

pub async fn run_pipeline(mut cfg: TriploadConfig, args: RunArgs) -> Result<i32> {
    apply_overrides(&mut cfg, &args);
    let settings = PipelineSettings::from_config(&cfg)?;
    let origin: Arc<dyn Origin> = Arc::new(CurlOrigin::new(cfg.curl_options()));
    let runner = build_pipeline(&cfg, &args, origin, settings)?;

    let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>(64);
    let printer = tokio::spawn(print_progress(progress_rx));

    let kind = args.files.kind;
    let year = args.files.year;
    let months = args.files.months.clone();
    let result = tokio::task::spawn_blocking(move || {
        runner.run(kind, year, &months, Some(&progress_tx))
    })
    .await
    .context("pipeline task panicked")?;
    let _ = printer.await;

    print_outcome(&result);
    Ok(pipeline::exit_code(&result))
}

/// Command-line flags take precedence over config.toml.
pub(crate) fn apply_overrides(cfg: &mut TriploadConfig, args: &RunArgs) {
    apply_dataset_overrides(cfg, &args.files);
    let dest = &mut cfg.destination;
    if let Some(bucket) = &args.bucket {
        dest.bucket = Some(bucket.clone());
    }
    if let Some(project) = &args.project {
        dest.project = Some(project.clone());
    }
    if let Some(dataset) = &args.dataset {
        dest.dataset = dataset.clone();
    }
    if let Some(location) = &args.location {
        dest.location = location.clone();
    }
    if let Some(wd) = args.write_disposition {
        dest.write_disposition = wd;
    }
    if let Some(n) = args.batch_size {
        cfg.batch_size = n;
    }
    if let Some(dir) = &args.download_dir {
        cfg.download_dir = Some(dir.clone());
    }
    if args.continue_on_load_error {
        cfg.load.on_failure = LoadFailurePolicy::Continue;
    }
}

pub(crate) fn build_pipeline(
    cfg: &TriploadConfig,
    args: &RunArgs,
    origin: Arc<dyn Origin>,
    settings: PipelineSettings,
) -> Result<Pipeline> {
    let dest = &cfg.destination;

    if let Some(dir) = &args.store_dir {
        let container = dest.bucket.clone().unwrap_or_else(|| LOCAL_CONTAINER.to_string());
        tracing::info!(dir = %dir.display(), %container, "staging into local directory");
        return Ok(Pipeline::new(origin, Arc::new(LocalStore::new(dir, container)), settings));
    }

    let bucket = dest
        .bucket
        .clone()
        .context("no bucket configured: pass --bucket or set destination.bucket in config.toml")?;
    let client = api_client(cfg)?;
    let mut gcs = GcsStore::new(client.clone(), bucket);
    if let Some(project) = &dest.project {
        gcs = gcs.with_project(project.clone());
    }
    let pipeline = Pipeline::new(origin, Arc::new(gcs), settings);
    if args.stage_only {
        return Ok(pipeline);
    }

    let project = dest
        .project
        .clone()
        .context(
            "no project configured: pass --project or set destination.project in config.toml \
             (a bare access token carries no default project to fall back to)",
        )?;
    let warehouse = BigQueryWarehouse::new(client)
        .with_location(dest.location.clone())
        .with_poll_interval(cfg.poll_interval());
    Ok(pipeline.with_warehouse(
        Arc::new(warehouse),
        Destination {
            project,
            dataset: dest.dataset.clone(),
            location: dest.location.clone(),
            write_disposition: dest.write_disposition,
        },
    ))
}

/// Bearer token from the configured environment variable.
fn api_client(cfg: &TriploadConfig) -> Result<ApiClient> {
    let token = std::env::var(&cfg.token_env)
        .with_context(|| format!("no access token: set {} (e.g. gcloud auth print-access-token)", cfg.token_env))?;
    Ok(cfg.api_client(token.trim()))
}

async fn print_progress(mut rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::BatchStarted { batch, batches, items } => {
                println!("batch {}/{}: {}", batch, batches, items.join(", "));
            }
            ProgressEvent::Advanced { phase, done, total } => {
                println!("  {} {}/{}", phase.label(), done, total);
            }
            ProgressEvent::BatchFinished {
                batch,
                retrieved,
                staged,
            } => {
                println!("batch {} done: downloaded {}, uploaded {}", batch, retrieved, staged);
            }
        }
    }
}

fn print_outcome(result: &Result<RunReport, PipelineError>) {
    match result {
        Ok(report) => {
            println!("{}", report.tally());
            if report.exhausted > 0 {
                println!("{} file(s) kept locally after failed uploads", report.exhausted);
            }
            for load in &report.loads {
                let rows = load
                    .table_rows
                    .map(|n| format!(", table now {} rows", n))
                    .unwrap_or_default();
                println!("loaded {} into {} (job {}{})", load.source_uri, load.table, load.job_id, rows);
            }
            for (artifact, err) in &report.load_failures {
                eprintln!("load failed for {}: {}", artifact.uri, err);
            }
        }
        Err(err) => eprintln!("tripload error: {}", err),
    }
}
