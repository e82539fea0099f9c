//! Progress reporting from the blocking pipeline to the CLI.
//!
//! Events are sent with `try_send`: a slow or absent consumer never stalls a
//! worker, at the cost of possibly dropping an intermediate update. Final
//! numbers always come from the run report, not from events.

/// Pipeline phase an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Upload,
    Load,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Download => "Downloading",
            Phase::Upload => "Uploading",
            Phase::Load => "Loading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A batch is about to run. `batch` is 1-based.
    BatchStarted {
        batch: usize,
        batches: usize,
        items: Vec<String>,
    },
    /// One more unit of `phase` finished (successfully or not).
    Advanced { phase: Phase, done: usize, total: usize },
    BatchFinished {
        batch: usize,
        retrieved: usize,
        staged: usize,
    },
}

pub type ProgressSender = tokio::sync::mpsc::Sender<ProgressEvent>;

/// Send `event` if a consumer is attached; drop it if the channel is full or closed.
pub fn emit(tx: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = tx {
        let _ = tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers_and_never_blocks() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        emit(
            Some(&tx),
            ProgressEvent::Advanced {
                phase: Phase::Download,
                done: 1,
                total: 3,
            },
        );
        // Channel full: dropped instead of blocking.
        emit(
            Some(&tx),
            ProgressEvent::Advanced {
                phase: Phase::Download,
                done: 2,
                total: 3,
            },
        );
        emit(None, ProgressEvent::Advanced { phase: Phase::Load, done: 0, total: 0 });

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            ProgressEvent::Advanced {
                phase: Phase::Download,
                done: 1,
                total: 3
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
