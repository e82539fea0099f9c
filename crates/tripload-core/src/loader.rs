//! Bulk loader: one warehouse load job per staged object, in key order.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, PipelineError};
use crate::progress::{self, Phase, ProgressEvent, ProgressSender};
use crate::store::RemoteArtifact;
use crate::warehouse::{LoadReport, LoadRequest, LoadTarget, Warehouse};

/// What to do with the remaining loads after one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadFailurePolicy {
    /// Stop at the first failure.
    #[default]
    Abort,
    /// Attempt every load and report failures together.
    Continue,
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub max_bad_records: u32,
    pub deadline: Duration,
    pub policy: LoadFailurePolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_bad_records: 1000,
            deadline: Duration::from_secs(3600),
            policy: LoadFailurePolicy::Abort,
        }
    }
}

/// Loads attempted by one run.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub reports: Vec<LoadReport>,
    /// Only populated under [`LoadFailurePolicy::Continue`].
    pub failures: Vec<(RemoteArtifact, LoadError)>,
}

pub struct BulkLoader<'a> {
    warehouse: &'a dyn Warehouse,
    target: &'a LoadTarget,
    opts: LoadOptions,
}

impl<'a> BulkLoader<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, target: &'a LoadTarget, opts: LoadOptions) -> Self {
        Self {
            warehouse,
            target,
            opts,
        }
    }

    /// Load one staged object into the target table and wait for the job.
    pub fn load(&self, artifact: &RemoteArtifact) -> Result<LoadReport, LoadError> {
        let request = LoadRequest {
            source_uri: &artifact.uri,
            target: self.target,
            max_bad_records: self.opts.max_bad_records,
            deadline: self.opts.deadline,
        };
        tracing::info!(uri = %artifact.uri, table = %self.target.table_ref(), "starting load job");
        let report = self.warehouse.load(&request)?;
        tracing::info!(
            uri = %artifact.uri,
            job_id = %report.job_id,
            output_rows = ?report.output_rows,
            table_rows = ?report.table_rows,
            "load job finished"
        );
        Ok(report)
    }

    /// Load every artifact sequentially, sorted by key.
    pub fn load_all(
        &self,
        artifacts: &[RemoteArtifact],
        progress_tx: Option<&ProgressSender>,
    ) -> Result<LoadSummary, PipelineError> {
        let mut ordered: Vec<&RemoteArtifact> = artifacts.iter().collect();
        ordered.sort();
        let total = ordered.len();

        let mut summary = LoadSummary::default();
        for (i, artifact) in ordered.into_iter().enumerate() {
            let outcome = self.load(artifact);
            progress::emit(
                progress_tx,
                ProgressEvent::Advanced {
                    phase: Phase::Load,
                    done: i + 1,
                    total,
                },
            );
            match outcome {
                Ok(report) => summary.reports.push(report),
                Err(source) => match self.opts.policy {
                    LoadFailurePolicy::Abort => {
                        return Err(PipelineError::Load {
                            artifact: artifact.clone(),
                            source,
                        })
                    }
                    LoadFailurePolicy::Continue => {
                        tracing::error!(uri = %artifact.uri, "load failed, continuing: {}", source);
                        summary.failures.push((artifact.clone(), source));
                    }
                },
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetKind, FileFormat};
    use crate::error::InfraError;
    use crate::warehouse::WriteDisposition;
    use std::sync::Mutex;

    /// Records load order; fails any URI containing "bad".
    #[derive(Default)]
    struct RecordingWarehouse {
        loads: Mutex<Vec<String>>,
    }

    impl Warehouse for RecordingWarehouse {
        fn ensure_dataset(&self, _: &str, _: &str, _: &str) -> Result<(), InfraError> {
            Ok(())
        }

        fn load(&self, request: &LoadRequest<'_>) -> Result<LoadReport, LoadError> {
            self.loads.lock().unwrap().push(request.source_uri.to_string());
            if request.source_uri.contains("bad") {
                return Err(LoadError::JobFailed {
                    job_id: "job-bad".into(),
                    reason: "invalid CSV".into(),
                });
            }
            Ok(LoadReport {
                source_uri: request.source_uri.to_string(),
                table: request.target.table_ref(),
                job_id: format!("job-{}", request.source_uri),
                output_rows: Some(10),
                table_rows: None,
            })
        }
    }

    fn artifact(key: &str) -> RemoteArtifact {
        RemoteArtifact {
            container: "bucket".into(),
            key: key.into(),
            uri: format!("gs://bucket/{key}"),
        }
    }

    fn target() -> LoadTarget {
        LoadTarget::for_kind(
            DatasetKind::Yellow,
            FileFormat::CsvGz,
            "proj",
            "nyc",
            WriteDisposition::Append,
        )
    }

    fn opts(policy: LoadFailurePolicy) -> LoadOptions {
        LoadOptions {
            policy,
            ..LoadOptions::default()
        }
    }

    #[test]
    fn loads_run_in_key_order() {
        let wh = RecordingWarehouse::default();
        let t = target();
        let loader = BulkLoader::new(&wh, &t, opts(LoadFailurePolicy::Abort));

        let summary = loader
            .load_all(&[artifact("b"), artifact("a"), artifact("c")], None)
            .unwrap();
        assert_eq!(summary.reports.len(), 3);
        assert_eq!(
            *wh.loads.lock().unwrap(),
            vec!["gs://bucket/a", "gs://bucket/b", "gs://bucket/c"]
        );
    }

    #[test]
    fn abort_stops_at_first_failure() {
        let wh = RecordingWarehouse::default();
        let t = target();
        let loader = BulkLoader::new(&wh, &t, opts(LoadFailurePolicy::Abort));

        let err = loader
            .load_all(&[artifact("c"), artifact("b-bad"), artifact("a")], None)
            .unwrap_err();
        match err {
            PipelineError::Load { artifact, .. } => assert_eq!(artifact.key, "b-bad"),
            other => panic!("expected Load error, got {other:?}"),
        }
        // "c" sorts after "b-bad" and is never attempted.
        assert_eq!(*wh.loads.lock().unwrap(), vec!["gs://bucket/a", "gs://bucket/b-bad"]);
    }

    #[test]
    fn continue_attempts_everything() {
        let wh = RecordingWarehouse::default();
        let t = target();
        let loader = BulkLoader::new(&wh, &t, opts(LoadFailurePolicy::Continue));

        let summary = loader
            .load_all(&[artifact("c"), artifact("b-bad"), artifact("a")], None)
            .unwrap();
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0.key, "b-bad");
        assert_eq!(wh.loads.lock().unwrap().len(), 3);
    }
}
