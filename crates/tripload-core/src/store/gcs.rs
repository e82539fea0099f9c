//! Google Cloud Storage backend (JSON API over curl).
//!
//! Existence is an object metadata GET; uploads use a resumable session and
//! `Content-Range` chunks so a large file never has to be sent in one request.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Instant;

use serde_json::json;

use super::{ObjectStore, PutOptions};
use crate::error::{InfraError, StoreError};
use crate::http::{encode_segment, ApiClient, HttpResponse};

const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Resumable upload chunks must be multiples of this size (except the last).
const CHUNK_ALIGN: usize = 256 * 1024;

/// Cloud Storage bucket.
#[derive(Debug, Clone)]
pub struct GcsStore {
    client: ApiClient,
    bucket: String,
    project: Option<String>,
    endpoint: String,
}

impl GcsStore {
    pub fn new(client: ApiClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            project: None,
            endpoint: STORAGE_ENDPOINT.to_string(),
        }
    }

    /// Project that owns the bucket; required to create a missing bucket.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Alternate API endpoint (emulators).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn bucket_url(&self) -> String {
        format!("{}/storage/v1/b/{}", self.endpoint, encode_segment(&self.bucket))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/o/{}?fields=name", self.bucket_url(), encode_segment(key))
    }

    fn start_session(&self, key: &str, total: u64) -> Result<String, StoreError> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=resumable&name={}",
            self.endpoint,
            encode_segment(&self.bucket),
            encode_segment(key)
        );
        let resp = self.client.send(
            "POST",
            &url,
            Some(b"{}".as_slice()),
            &[
                "Content-Type: application/json; charset=UTF-8".to_string(),
                format!("X-Upload-Content-Length: {total}"),
            ],
            None,
        )?;
        if !resp.is_success() {
            return Err(status_error(&resp));
        }
        resp.header("Location")
            .map(str::to_string)
            .ok_or_else(|| StoreError::Protocol("resumable session response has no Location".into()))
    }
}

impl ObjectStore for GcsStore {
    fn container(&self) -> &str {
        &self.bucket
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let resp = self.client.get(&self.object_url(key))?;
        match resp.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error(&resp)),
        }
    }

    fn put(&self, local: &Path, key: &str, opts: &PutOptions) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: local.to_path_buf(),
            source,
        };
        let mut file = File::open(local).map_err(io_err)?;
        let total = file.metadata().map_err(io_err)?.len();
        let chunk_size = opts.chunk_size.max(1).div_ceil(CHUNK_ALIGN) * CHUNK_ALIGN;
        let deadline = Instant::now() + opts.timeout;

        let session = self.start_session(key, total)?;
        let mut buf = Vec::with_capacity(chunk_size);
        let mut offset = 0u64;

        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or_else(|| StoreError::Protocol(format!("upload of {key} timed out")))?;

            file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
            buf.clear();
            (&mut file)
                .take(chunk_size as u64)
                .read_to_end(&mut buf)
                .map_err(io_err)?;
            let n = buf.len() as u64;
            if n == 0 && offset < total {
                return Err(StoreError::Protocol(format!(
                    "{} shrank during upload ({} of {} bytes read)",
                    local.display(),
                    offset,
                    total
                )));
            }

            let content_range = if total == 0 {
                "Content-Range: bytes */0".to_string()
            } else {
                format!("Content-Range: bytes {}-{}/{}", offset, offset + n - 1, total)
            };
            let resp = self
                .client
                .send("PUT", &session, Some(buf.as_slice()), &[content_range], Some(remaining))?;

            match resp.status {
                200 | 201 => return Ok(()),
                // Resume Incomplete: the server reports how much it has persisted.
                308 => {
                    offset = committed_bytes(&resp);
                    tracing::trace!(key, offset, total, "upload chunk committed");
                }
                _ => return Err(status_error(&resp)),
            }
        }
    }

    fn ensure_container(&self) -> Result<(), InfraError> {
        let resource = format!("bucket '{}'", self.bucket);
        let transport = |source| InfraError::Transport {
            resource: resource.clone(),
            source,
        };

        let resp = self.client.get(&self.bucket_url()).map_err(transport)?;
        match resp.status {
            200 => {
                tracing::info!(bucket = %self.bucket, "bucket exists and is accessible");
                return Ok(());
            }
            403 => return Err(InfraError::Forbidden { resource }),
            404 => {}
            status => {
                return Err(InfraError::Status {
                    resource,
                    status,
                    message: resp.error_text(),
                })
            }
        }

        let Some(project) = self.project.as_deref() else {
            return Err(InfraError::Status {
                resource,
                status: 404,
                message: "bucket does not exist and no project is configured to create it".into(),
            });
        };
        let url = format!(
            "{}/storage/v1/b?project={}",
            self.endpoint,
            encode_segment(project)
        );
        let resp = self
            .client
            .post_json(&url, &json!({ "name": self.bucket }))
            .map_err(transport)?;
        match resp.status {
            200 => {
                tracing::info!(bucket = %self.bucket, project, "created bucket");
                Ok(())
            }
            // Name taken by someone else's project.
            403 | 409 => Err(InfraError::Forbidden { resource }),
            status => Err(InfraError::Status {
                resource,
                status,
                message: resp.error_text(),
            }),
        }
    }

    fn uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }
}

fn status_error(resp: &HttpResponse) -> StoreError {
    StoreError::Status {
        status: resp.status,
        message: resp.error_text(),
    }
}

/// Bytes persisted so far, from a 308 `Range: bytes=0-N` header (none → 0).
fn committed_bytes(resp: &HttpResponse) -> u64 {
    resp.header("Range")
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.split_once('-'))
        .and_then(|(_, end)| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .unwrap_or(0)
}
