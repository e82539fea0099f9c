//! Staging stage: move local artifacts into the object store.
//!
//! Each attempt is check, upload, re-check. Remote existence is the only
//! proof of success: a transfer that returned OK but is not visible
//! afterwards is retried like any other failure. The local file is removed
//! only once the object is verified present.
//!
//! The check-then-upload sequence is not atomic. Two concurrent runs on the
//! same item may both upload; bytes and key are identical, so the last write
//! wins harmlessly.

use std::time::Duration;

use crate::error::StoreError;
use crate::pool;
use crate::progress::{self, Phase, ProgressEvent, ProgressSender};
use crate::retrieval::LocalArtifact;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{self, ObjectStore, PutOptions, RemoteArtifact};

/// Why one attempt did not produce a verified object.
#[derive(Debug)]
pub enum RetryReason {
    ExistenceCheck(StoreError),
    Transfer(StoreError),
    /// Upload reported success but the object is not visible.
    NotVisible,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::ExistenceCheck(e) => write!(f, "existence check failed: {e}"),
            RetryReason::Transfer(e) => write!(f, "upload failed: {e}"),
            RetryReason::NotVisible => f.write_str("object not visible after upload"),
        }
    }
}

/// Result of a single check+upload+verify cycle.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Object verified present. `uploaded` is false when it already existed.
    Success { artifact: RemoteArtifact, uploaded: bool },
    Retryable(RetryReason),
}

/// Final result of staging one local artifact.
#[derive(Debug)]
pub enum StageOutcome {
    Staged {
        artifact: RemoteArtifact,
        attempts: u32,
        already_present: bool,
    },
    /// Attempt budget spent; the local file is kept.
    Exhausted {
        local: LocalArtifact,
        key: String,
        attempts: u32,
        last_reason: RetryReason,
    },
}

impl StageOutcome {
    pub fn artifact(&self) -> Option<&RemoteArtifact> {
        match self {
            StageOutcome::Staged { artifact, .. } => Some(artifact),
            StageOutcome::Exhausted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StagingOptions {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub put: PutOptions,
    /// Pause after a verified upload. Not applied when the object already existed.
    pub pacing: Duration,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            put: PutOptions::default(),
            pacing: Duration::from_millis(750),
        }
    }
}

pub struct Stager<'a> {
    store: &'a dyn ObjectStore,
    prefix: &'a str,
    opts: StagingOptions,
}

impl<'a> Stager<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: &'a str, opts: StagingOptions) -> Self {
        Self { store, prefix, opts }
    }

    /// Object key of a local artifact. The key is derived from the local
    /// file name, which is itself derived from the work item.
    pub fn key_for(&self, local: &LocalArtifact) -> String {
        let file_name = local
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        store::key_for_file(self.prefix, &file_name)
    }

    /// One check, upload, verify cycle.
    pub fn attempt(&self, local: &LocalArtifact, key: &str) -> AttemptOutcome {
        match self.store.exists(key) {
            Ok(true) => {
                return AttemptOutcome::Success {
                    artifact: self.store.artifact(key),
                    uploaded: false,
                }
            }
            Ok(false) => {}
            Err(e) => return AttemptOutcome::Retryable(RetryReason::ExistenceCheck(e)),
        }

        if let Err(e) = self.store.put(&local.path, key, &self.opts.put) {
            return AttemptOutcome::Retryable(RetryReason::Transfer(e));
        }

        match self.store.exists(key) {
            Ok(true) => AttemptOutcome::Success {
                artifact: self.store.artifact(key),
                uploaded: true,
            },
            Ok(false) => AttemptOutcome::Retryable(RetryReason::NotVisible),
            Err(e) => AttemptOutcome::Retryable(RetryReason::ExistenceCheck(e)),
        }
    }

    /// Stage one artifact, retrying per the policy.
    pub fn stage(&self, local: LocalArtifact) -> StageOutcome {
        let key = self.key_for(&local);
        let mut attempt = 1u32;
        loop {
            match self.attempt(&local, &key) {
                AttemptOutcome::Success { artifact, uploaded } => {
                    if uploaded {
                        tracing::info!(key = %key, attempt, "uploaded and verified");
                        if !self.opts.pacing.is_zero() {
                            std::thread::sleep(self.opts.pacing);
                        }
                    } else {
                        tracing::info!(key = %key, "already staged, skipping upload");
                    }
                    remove_local(&local);
                    return StageOutcome::Staged {
                        artifact,
                        attempts: attempt,
                        already_present: !uploaded,
                    };
                }
                AttemptOutcome::Retryable(reason) => match self.opts.retry.decide(attempt) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(key = %key, attempt, "retrying after {:?}: {}", delay, reason);
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                        attempt += 1;
                    }
                    RetryDecision::NoRetry => {
                        tracing::warn!(
                            key = %key,
                            attempts = attempt,
                            path = %local.path.display(),
                            "giving up on upload, local file kept: {}",
                            reason
                        );
                        return StageOutcome::Exhausted {
                            local,
                            key,
                            attempts: attempt,
                            last_reason: reason,
                        };
                    }
                },
            }
        }
    }

    /// Stage every artifact on the worker pool. Outcomes come back in
    /// completion order.
    pub fn stage_all(
        &self,
        locals: Vec<LocalArtifact>,
        progress_tx: Option<&ProgressSender>,
    ) -> Vec<StageOutcome> {
        let total = locals.len();
        let mut done = 0usize;
        pool::run_bounded(
            locals,
            self.opts.workers,
            |local| self.stage(local),
            |_| {
                done += 1;
                progress::emit(
                    progress_tx,
                    ProgressEvent::Advanced {
                        phase: Phase::Upload,
                        done,
                        total,
                    },
                );
            },
        )
    }
}

fn remove_local(local: &LocalArtifact) {
    if let Err(e) = std::fs::remove_file(&local.path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %local.path.display(), "could not remove staged local file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetKind, FileFormat, Period, WorkItem};
    use crate::error::InfraError;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory store with scripted failures.
    #[derive(Default)]
    struct FakeStore {
        objects: Mutex<HashSet<String>>,
        puts: AtomicU32,
        exists_calls: AtomicU32,
        /// Number of puts that fail before one succeeds.
        failing_puts: AtomicU32,
        /// Number of puts that "succeed" without the object becoming visible.
        invisible_puts: AtomicU32,
    }

    impl FakeStore {
        fn with_object(key: &str) -> Self {
            let s = Self::default();
            s.objects.lock().unwrap().insert(key.to_string());
            s
        }
    }

    impl ObjectStore for FakeStore {
        fn container(&self) -> &str {
            "bucket"
        }

        fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.objects.lock().unwrap().contains(key))
        }

        fn put(&self, _local: &Path, key: &str, _opts: &PutOptions) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self
                .failing_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Status {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            if self
                .invisible_puts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Ok(());
            }
            self.objects.lock().unwrap().insert(key.to_string());
            Ok(())
        }

        fn ensure_container(&self) -> Result<(), InfraError> {
            Ok(())
        }

        fn uri(&self, key: &str) -> String {
            format!("mem://bucket/{key}")
        }
    }

    fn opts(max_attempts: u32) -> StagingOptions {
        StagingOptions {
            workers: 2,
            retry: RetryPolicy::new(max_attempts, Duration::ZERO),
            put: PutOptions::default(),
            pacing: Duration::ZERO,
        }
    }

    fn local_in(dir: &Path, month: u8) -> LocalArtifact {
        let item = WorkItem::new(DatasetKind::Yellow, 2021, Period::new(month).unwrap());
        let path = dir.join(item.file_name(FileFormat::CsvGz));
        std::fs::write(&path, b"vendor,pickup\n1,2021-01-01\n").unwrap();
        LocalArtifact { item, path }
    }

    #[test]
    fn existing_object_is_not_uploaded_and_local_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_in(dir.path(), 1);
        let store = FakeStore::with_object("raw/yellow_tripdata_2021-01.csv.gz");
        let stager = Stager::new(&store, "raw", opts(3));

        let outcome = stager.stage(local.clone());
        match outcome {
            StageOutcome::Staged {
                artifact,
                attempts,
                already_present,
            } => {
                assert_eq!(artifact.key, "raw/yellow_tripdata_2021-01.csv.gz");
                assert_eq!(artifact.uri, "mem://bucket/raw/yellow_tripdata_2021-01.csv.gz");
                assert_eq!(attempts, 1);
                assert!(already_present);
            }
            other => panic!("expected Staged, got {other:?}"),
        }
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
        assert!(!local.path.exists());
    }

    #[test]
    fn upload_then_verify_removes_local() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_in(dir.path(), 2);
        let store = FakeStore::default();
        let stager = Stager::new(&store, "", opts(3));

        let outcome = stager.stage(local.clone());
        assert_eq!(
            outcome.artifact().map(|a| a.key.as_str()),
            Some("yellow_tripdata_2021-02.csv.gz")
        );
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        // Pre-check and post-check.
        assert_eq!(store.exists_calls.load(Ordering::SeqCst), 2);
        assert!(!local.path.exists());
    }

    #[test]
    fn transient_put_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_in(dir.path(), 3);
        let store = FakeStore::default();
        store.failing_puts.store(1, Ordering::SeqCst);
        let stager = Stager::new(&store, "raw", opts(3));

        match stager.stage(local) {
            StageOutcome::Staged { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected Staged, got {other:?}"),
        }
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invisible_upload_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_in(dir.path(), 4);
        let store = FakeStore::default();
        store.invisible_puts.store(1, Ordering::SeqCst);
        let stager = Stager::new(&store, "raw", opts(3));

        match stager.stage(local) {
            StageOutcome::Staged {
                attempts,
                already_present,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert!(!already_present);
            }
            other => panic!("expected Staged, got {other:?}"),
        }
    }

    #[test]
    fn attempts_are_bounded_and_local_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_in(dir.path(), 5);
        let store = FakeStore::default();
        store.failing_puts.store(100, Ordering::SeqCst);
        let stager = Stager::new(&store, "raw", opts(3));

        match stager.stage(local.clone()) {
            StageOutcome::Exhausted {
                key,
                attempts,
                last_reason,
                ..
            } => {
                assert_eq!(key, "raw/yellow_tripdata_2021-05.csv.gz");
                assert_eq!(attempts, 3);
                assert!(matches!(last_reason, RetryReason::Transfer(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(store.puts.load(Ordering::SeqCst), 3);
        assert!(local.path.exists());
    }

    #[test]
    fn zero_attempt_budget_still_tries_once() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_in(dir.path(), 6);
        let store = FakeStore::default();
        store.failing_puts.store(100, Ordering::SeqCst);
        let stager = Stager::new(&store, "raw", opts(0));

        assert!(matches!(
            stager.stage(local),
            StageOutcome::Exhausted { attempts: 1, .. }
        ));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_all_reports_every_item() {
        let dir = tempfile::tempdir().unwrap();
        let locals: Vec<_> = (1..=4).map(|m| local_in(dir.path(), m)).collect();
        let store = FakeStore::default();
        let stager = Stager::new(&store, "raw", opts(2));

        let outcomes = stager.stage_all(locals, None);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.artifact().is_some()));
        assert_eq!(store.objects.lock().unwrap().len(), 4);
    }
}
