//! Batch coordinator: bounds how many downloaded files sit on local disk.
//!
//! Items are cut into contiguous batches in their original order. Each batch
//! is retrieved, then staged, before the next one starts; staging removes
//! the local copies, so disk usage stays around one batch.

use crate::dataset::WorkItem;
use crate::progress::{self, ProgressEvent, ProgressSender};
use crate::retrieval::Retriever;
use crate::staging::{StageOutcome, Stager};
use crate::store::RemoteArtifact;

/// Split `items` into contiguous batches of `size` (0 is treated as 1).
/// The last batch may be shorter.
pub fn partition<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Per-batch counters. Logged, then folded into the run totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResult {
    pub index: usize,
    pub items: usize,
    pub retrieved: usize,
    pub staged: usize,
}

/// Totals over every batch of a run.
#[derive(Debug, Default)]
pub struct BatchRun {
    /// Verified remote artifacts, in completion order.
    pub staged: Vec<RemoteArtifact>,
    pub retrieved: usize,
    /// Items whose upload gave up; their local files were kept.
    pub exhausted: usize,
}

pub struct BatchCoordinator<'a> {
    retriever: &'a Retriever<'a>,
    stager: &'a Stager<'a>,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(retriever: &'a Retriever<'a>, stager: &'a Stager<'a>) -> Self {
        Self { retriever, stager }
    }

    pub fn run(&self, items: &[WorkItem], batch_size: usize, progress_tx: Option<&ProgressSender>) -> BatchRun {
        let batches = partition(items, batch_size);
        let count = batches.len();
        let mut run = BatchRun::default();

        for (i, batch) in batches.iter().enumerate() {
            let index = i + 1;
            tracing::info!(batch = index, batches = count, items = batch.len(), "starting batch");
            progress::emit(
                progress_tx,
                ProgressEvent::BatchStarted {
                    batch: index,
                    batches: count,
                    items: batch.iter().map(ToString::to_string).collect(),
                },
            );

            let result = self.run_batch(index, batch, progress_tx, &mut run);
            tracing::info!(
                batch = result.index,
                items = result.items,
                retrieved = result.retrieved,
                staged = result.staged,
                "batch finished"
            );
            progress::emit(
                progress_tx,
                ProgressEvent::BatchFinished {
                    batch: result.index,
                    retrieved: result.retrieved,
                    staged: result.staged,
                },
            );
        }
        run
    }

    fn run_batch(
        &self,
        index: usize,
        batch: &[WorkItem],
        progress_tx: Option<&ProgressSender>,
        run: &mut BatchRun,
    ) -> BatchResult {
        let mut result = BatchResult {
            index,
            items: batch.len(),
            retrieved: 0,
            staged: 0,
        };

        let locals = self.retriever.fetch_all(batch, progress_tx);
        result.retrieved = locals.len();
        run.retrieved += locals.len();
        if locals.is_empty() {
            tracing::warn!(batch = index, "no files downloaded in batch, skipping upload");
            return result;
        }

        for outcome in self.stager.stage_all(locals, progress_tx) {
            match outcome {
                StageOutcome::Staged { artifact, .. } => {
                    result.staged += 1;
                    run.staged.push(artifact);
                }
                StageOutcome::Exhausted { .. } => run.exhausted += 1,
            }
        }
        result
    }
}
