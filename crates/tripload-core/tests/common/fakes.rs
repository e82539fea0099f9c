//! In-memory collaborators for pipeline tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tripload_core::error::{InfraError, LoadError, StoreError};
use tripload_core::store::{ObjectStore, PutOptions};
use tripload_core::warehouse::{LoadReport, LoadRequest, Warehouse};

/// Records datasets ensured and loads requested. Fails loads whose URI
/// contains `fail_marker`, if set, and refuses every dataset when `forbidden`.
#[derive(Default)]
pub struct FakeWarehouse {
    pub datasets: Mutex<Vec<String>>,
    pub loads: Mutex<Vec<String>>,
    pub fail_marker: Option<String>,
    pub forbidden: bool,
}

impl FakeWarehouse {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn forbidden() -> Self {
        Self {
            forbidden: true,
            ..Self::default()
        }
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

impl Warehouse for FakeWarehouse {
    fn ensure_dataset(&self, project: &str, dataset: &str, _location: &str) -> Result<(), InfraError> {
        if self.forbidden {
            return Err(InfraError::Forbidden {
                resource: format!("dataset {project}.{dataset}"),
            });
        }
        self.datasets
            .lock()
            .unwrap()
            .push(format!("{project}.{dataset}"));
        Ok(())
    }

    fn load(&self, request: &LoadRequest<'_>) -> Result<LoadReport, LoadError> {
        self.loads
            .lock()
            .unwrap()
            .push(request.source_uri.to_string());
        if let Some(marker) = &self.fail_marker {
            if request.source_uri.contains(marker.as_str()) {
                return Err(LoadError::JobFailed {
                    job_id: "job_failed".into(),
                    reason: "Error while reading data".into(),
                });
            }
        }
        Ok(LoadReport {
            source_uri: request.source_uri.to_string(),
            table: request.target.table_ref(),
            job_id: format!("job_{}", self.loads.lock().unwrap().len()),
            output_rows: Some(2),
            table_rows: None,
        })
    }
}

/// Wraps a real store, counts puts and rejects every put whose key
/// contains `reject_marker`. With `forbidden`, the container check fails.
pub struct CountingStore<S> {
    pub inner: S,
    pub puts: AtomicUsize,
    pub reject_marker: Option<String>,
    pub forbidden: bool,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            reject_marker: None,
            forbidden: false,
        }
    }

    pub fn forbidden(inner: S) -> Self {
        Self {
            forbidden: true,
            ..Self::new(inner)
        }
    }

    pub fn rejecting(inner: S, marker: &str) -> Self {
        Self {
            reject_marker: Some(marker.to_string()),
            ..Self::new(inner)
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    fn container(&self) -> &str {
        self.inner.container()
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key)
    }

    fn put(&self, local: &Path, key: &str, opts: &PutOptions) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.reject_marker {
            if key.contains(marker.as_str()) {
                return Err(StoreError::Status {
                    status: 503,
                    message: "backend unavailable".into(),
                });
            }
        }
        self.inner.put(local, key, opts)
    }

    fn ensure_container(&self) -> Result<(), InfraError> {
        if self.forbidden {
            return Err(InfraError::Forbidden {
                resource: format!("bucket '{}'", self.inner.container()),
            });
        }
        self.inner.ensure_container()
    }

    fn uri(&self, key: &str) -> String {
        self.inner.uri(key)
    }
}
