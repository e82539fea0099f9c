//! Error taxonomy shared by the pipeline stages.
//!
//! Per-item failures (`FetchError`, `StoreError`) are isolated by the stage
//! that hits them. `InfraError` and `LoadError` are fatal for the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::RemoteArtifact;

/// Invalid dataset kind, period or period expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown dataset kind '{0}' (expected 'yellow' or 'green')")]
    UnknownKind(String),

    #[error("invalid month: {0}")]
    InvalidPeriod(String),

    #[error("invalid month range '{0}' (example: 1-6 or 01-06)")]
    InvalidRange(String),

    #[error("empty month expression")]
    EmptyExpression,

    #[error("unknown origin layout '{0}' (expected 'datatalksclub' or 'tlc')")]
    UnknownOrigin(String),

    #[error("unknown write disposition '{0}' (expected 'append', 'truncate' or 'empty')")]
    UnknownDisposition(String),

    #[error("invalid origin base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Failure fetching one file from the origin. Never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: curl::Error,
    },

    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u32 },

    #[error("local file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure talking to the object store during staging. Retried by the stager.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store request failed: {0}")]
    Transport(#[from] curl::Error),

    #[error("object store returned HTTP {status}: {message}")]
    Status { status: u32, message: String },

    #[error("object store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store protocol error: {0}")]
    Protocol(String),
}

/// Destination container or dataset is missing and cannot be created, or is
/// not accessible. Fatal before any work starts.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("{resource} exists but is not accessible with the current credentials")]
    Forbidden { resource: String },

    #[error("{resource}: HTTP {status}: {message}")]
    Status {
        resource: String,
        status: u32,
        message: String,
    },

    #[error("{resource}: request failed: {source}")]
    Transport {
        resource: String,
        #[source]
        source: curl::Error,
    },

    #[error("{resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: std::io::Error,
    },
}

/// A warehouse load job was rejected, failed, or did not finish in time.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("load request failed: {0}")]
    Transport(#[from] curl::Error),

    #[error("warehouse returned HTTP {status}: {message}")]
    Status { status: u32, message: String },

    #[error("load job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("load job {job_id} did not finish within {waited_secs}s")]
    DeadlineExceeded { job_id: String, waited_secs: u64 },

    #[error("unexpected warehouse response: {0}")]
    Protocol(String),
}

/// Run-level failure. Maps to a non-zero exit status.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("infrastructure check failed: {0}")]
    Infra(#[from] InfraError),

    #[error("no files downloaded")]
    NothingRetrieved,

    #[error("no files uploaded")]
    NothingStaged,

    #[error("loading {} failed: {source}", artifact.uri)]
    Load {
        artifact: RemoteArtifact,
        #[source]
        source: LoadError,
    },
}
