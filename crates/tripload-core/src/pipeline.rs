//! Run orchestration: bootstrap, batched retrieve+stage, then bulk load.
//!
//! Collaborators are built once by the caller and injected. Without a
//! warehouse the pipeline stops after staging.

use std::path::PathBuf;
use std::sync::Arc;

use crate::batch::BatchCoordinator;
use crate::config::TriploadConfig;
use crate::dataset::{DatasetKind, WorkItem};
use crate::error::{InfraError, InputError, LoadError, PipelineError};
use crate::loader::{BulkLoader, LoadOptions};
use crate::locator::Locator;
use crate::progress::ProgressSender;
use crate::retrieval::{Origin, RetrievalOptions, Retriever};
use crate::staging::{Stager, StagingOptions};
use crate::store::{ObjectStore, RemoteArtifact};
use crate::warehouse::{LoadReport, LoadTarget, Warehouse, WriteDisposition};

/// Dataset-level destination of the loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub project: String,
    pub dataset: String,
    pub location: String,
    pub write_disposition: WriteDisposition,
}

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub locator: Locator,
    pub download_dir: PathBuf,
    pub prefix: String,
    pub batch_size: usize,
    pub retrieval: RetrievalOptions,
    pub staging: StagingOptions,
    pub load: LoadOptions,
}

impl PipelineSettings {
    pub fn from_config(cfg: &TriploadConfig) -> Result<Self, InputError> {
        Ok(Self {
            locator: cfg.locator()?,
            download_dir: cfg.download_dir(),
            prefix: cfg.destination.prefix.clone(),
            batch_size: cfg.batch_size,
            retrieval: cfg.retrieval_options(),
            staging: cfg.staging_options(),
            load: cfg.load_options(),
        })
    }
}

/// Outcome of a run that got as far as staging.
#[derive(Debug, Default)]
pub struct RunReport {
    pub requested: usize,
    pub retrieved: usize,
    /// Verified remote artifacts, sorted by key.
    pub staged: Vec<RemoteArtifact>,
    /// Items whose upload gave up; their local files were kept.
    pub exhausted: usize,
    pub loads: Vec<LoadReport>,
    pub load_failures: Vec<(RemoteArtifact, LoadError)>,
}

impl RunReport {
    /// `staged N/M`
    pub fn tally(&self) -> String {
        format!("staged {}/{}", self.staged.len(), self.requested)
    }

    pub fn exit_code(&self) -> i32 {
        if self.load_failures.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Process exit status of a finished run.
pub fn exit_code(result: &Result<RunReport, PipelineError>) -> i32 {
    match result {
        Ok(report) => report.exit_code(),
        Err(_) => 1,
    }
}

struct LoadStage {
    warehouse: Arc<dyn Warehouse>,
    destination: Destination,
}

pub struct Pipeline {
    origin: Arc<dyn Origin>,
    store: Arc<dyn ObjectStore>,
    load: Option<LoadStage>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Stage-only pipeline. Add a warehouse with [`Pipeline::with_warehouse`].
    pub fn new(origin: Arc<dyn Origin>, store: Arc<dyn ObjectStore>, settings: PipelineSettings) -> Self {
        Self {
            origin,
            store,
            load: None,
            settings,
        }
    }

    pub fn with_warehouse(mut self, warehouse: Arc<dyn Warehouse>, destination: Destination) -> Self {
        self.load = Some(LoadStage {
            warehouse,
            destination,
        });
        self
    }

    /// Make sure the bucket (and dataset, when loading) exist before any transfer.
    pub fn bootstrap(&self) -> Result<(), InfraError> {
        self.store.ensure_container()?;
        tracing::info!(container = %self.store.container(), "object store container ready");
        if let Some(stage) = &self.load {
            let d = &stage.destination;
            stage
                .warehouse
                .ensure_dataset(&d.project, &d.dataset, &d.location)?;
            tracing::info!(project = %d.project, dataset = %d.dataset, "warehouse dataset ready");
        }
        Ok(())
    }

    /// Expand `months` for `kind`/`year` and run every stage.
    pub fn run(
        &self,
        kind: DatasetKind,
        year: u16,
        months: &str,
        progress_tx: Option<&ProgressSender>,
    ) -> Result<RunReport, PipelineError> {
        let items = WorkItem::expand(kind, year, months)?;
        self.bootstrap()?;

        let s = &self.settings;
        std::fs::create_dir_all(&s.download_dir).map_err(|source| InfraError::Io {
            resource: s.download_dir.display().to_string(),
            source,
        })?;

        let retriever = Retriever::new(self.origin.as_ref(), &s.locator, &s.download_dir, s.retrieval);
        let stager = Stager::new(self.store.as_ref(), &s.prefix, s.staging);
        let batches = BatchCoordinator::new(&retriever, &stager).run(&items, s.batch_size, progress_tx);

        let mut report = RunReport {
            requested: items.len(),
            retrieved: batches.retrieved,
            staged: batches.staged,
            exhausted: batches.exhausted,
            ..RunReport::default()
        };
        report.staged.sort();
        tracing::info!(
            requested = report.requested,
            retrieved = report.retrieved,
            staged = report.staged.len(),
            exhausted = report.exhausted,
            "retrieve and stage finished"
        );

        if report.retrieved == 0 {
            return Err(PipelineError::NothingRetrieved);
        }
        if report.staged.is_empty() {
            return Err(PipelineError::NothingStaged);
        }

        if let Some(stage) = &self.load {
            let d = &stage.destination;
            let target = LoadTarget::for_kind(
                kind,
                s.locator.format(),
                &d.project,
                &d.dataset,
                d.write_disposition,
            );
            let loader = BulkLoader::new(stage.warehouse.as_ref(), &target, s.load);
            let summary = loader.load_all(&report.staged, progress_tx)?;
            report.loads = summary.reports;
            report.load_failures = summary.failures;
        }
        Ok(report)
    }
}
