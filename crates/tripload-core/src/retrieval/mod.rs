//! Retrieval stage: fetch work items from the origin into the download dir.
//!
//! A file already present with non-zero size is reused without touching the
//! network, which makes reruns cheap. Transfers are never retried here; a
//! failed item is logged and dropped for this run.

mod curl_origin;

pub use curl_origin::{temp_path, CurlOptions, CurlOrigin};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::WorkItem;
use crate::error::FetchError;
use crate::locator::Locator;
use crate::pool;
use crate::progress::{self, Phase, ProgressEvent, ProgressSender};

/// Source of dataset files. Shared across worker threads.
pub trait Origin: Send + Sync {
    /// Download `url` to `dest`. Returns the number of bytes written.
    /// On error, `dest` must not exist afterwards.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// A fetched file on local disk, owned by the run until staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub item: WorkItem,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub workers: usize,
    /// Pause after each completed transfer, on the worker that made it.
    pub pacing: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            pacing: Duration::from_millis(500),
        }
    }
}

pub struct Retriever<'a> {
    origin: &'a dyn Origin,
    locator: &'a Locator,
    download_dir: &'a Path,
    opts: RetrievalOptions,
}

impl<'a> Retriever<'a> {
    pub fn new(
        origin: &'a dyn Origin,
        locator: &'a Locator,
        download_dir: &'a Path,
        opts: RetrievalOptions,
    ) -> Self {
        Self {
            origin,
            locator,
            download_dir,
            opts,
        }
    }

    /// Deterministic local path of an item.
    pub fn local_path(&self, item: &WorkItem) -> PathBuf {
        self.download_dir.join(item.file_name(self.locator.format()))
    }

    /// Fetch one item, reusing a non-empty local copy if present.
    pub fn fetch(&self, item: &WorkItem) -> Result<LocalArtifact, FetchError> {
        let path = self.local_path(item);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                tracing::debug!(path = %path.display(), "already downloaded, skipping fetch");
                return Ok(LocalArtifact { item: *item, path });
            }
            _ => {}
        }

        let url = self.locator.url_for(item);
        let bytes = self.origin.download(&url, &path)?;
        tracing::info!(%url, bytes, "downloaded");
        if !self.opts.pacing.is_zero() {
            std::thread::sleep(self.opts.pacing);
        }
        Ok(LocalArtifact { item: *item, path })
    }

    /// Fetch every item on the worker pool. Returns the successes in
    /// completion order; failures are logged and omitted.
    pub fn fetch_all(&self, items: &[WorkItem], progress_tx: Option<&ProgressSender>) -> Vec<LocalArtifact> {
        let total = items.len();
        let mut done = 0usize;
        let results = pool::run_bounded(
            items.to_vec(),
            self.opts.workers,
            |item| (item, self.fetch(&item)),
            |_| {
                done += 1;
                progress::emit(
                    progress_tx,
                    ProgressEvent::Advanced {
                        phase: Phase::Download,
                        done,
                        total,
                    },
                );
            },
        );

        results
            .into_iter()
            .filter_map(|(item, res)| match res {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    tracing::warn!(%item, "download failed: {}", e);
                    None
                }
            })
            .collect()
    }
}
