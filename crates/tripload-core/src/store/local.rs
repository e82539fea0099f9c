//! Directory-backed object store.
//!
//! Objects live at `{root}/{container}/{key}`. Writes go through a temp file
//! in the destination directory and are renamed into place, so an object is
//! either absent or complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{ObjectStore, PutOptions};
use crate::error::{InfraError, StoreError};

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    container: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
        }
    }

    fn container_dir(&self) -> PathBuf {
        self.root.join(&self.container)
    }

    /// Filesystem path of `key`.
    pub fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.container_dir(), |p, segment| p.join(segment))
    }
}

impl ObjectStore for LocalStore {
    fn container(&self) -> &str {
        &self.container
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(key);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn put(&self, local: &Path, key: &str, _opts: &PutOptions) -> Result<(), StoreError> {
        let dest = self.object_path(key);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };
        let parent = dest
            .parent()
            .ok_or_else(|| StoreError::Protocol(format!("invalid object key '{key}'")))?;
        fs::create_dir_all(parent).map_err(io_err(parent))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err(parent))?;
        let mut src = fs::File::open(local).map_err(io_err(local))?;
        io::copy(&mut src, tmp.as_file_mut()).map_err(io_err(local))?;
        tmp.as_file().sync_all().map_err(io_err(&dest))?;
        tmp.persist(&dest)
            .map_err(|e| StoreError::Io {
                path: dest.clone(),
                source: e.error,
            })?;
        Ok(())
    }

    fn ensure_container(&self) -> Result<(), InfraError> {
        let dir = self.container_dir();
        fs::create_dir_all(&dir).map_err(|source| match source.kind() {
            io::ErrorKind::PermissionDenied => InfraError::Forbidden {
                resource: format!("directory {}", dir.display()),
            },
            _ => InfraError::Io {
                resource: format!("directory {}", dir.display()),
                source,
            },
        })?;
        tracing::info!(path = %dir.display(), "local store ready");
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        format!("file://{}", self.object_path(key).display())
    }
}
