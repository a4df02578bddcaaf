//! Filesystem page store.
//!
//! Artifacts live under a root directory keyed by
//! [`BuildTarget::artifact_key`]; staleness is a sidecar marker file so
//! it survives process restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use sumi_core::build::BuildTarget;
use sumi_core::error::CoreError;
use sumi_core::ports::PageStore;

pub struct FsPageStore {
    root: PathBuf,
}

impl FsPageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn artifact_path(&self, target: &BuildTarget) -> PathBuf {
        self.root.join(target.artifact_key())
    }

    fn stale_path(&self, target: &BuildTarget) -> PathBuf {
        let mut path = self.artifact_path(target);
        path.set_extension("stale");
        path
    }
}

fn io_err(op: &str, path: &Path, e: std::io::Error) -> CoreError {
    CoreError::Build(format!("{op} {} failed: {e}", path.display()))
}

#[async_trait]
impl PageStore for FsPageStore {
    async fn write(&self, target: &BuildTarget, bytes: &[u8]) -> Result<(), CoreError> {
        let path = self.artifact_path(target);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create dir", parent, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_err("write", &path, e))?;

        let marker = self.stale_path(target);
        match tokio::fs::remove_file(&marker).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove", &marker, e)),
        }
    }

    async fn read(&self, target: &BuildTarget) -> Result<Option<Vec<u8>>, CoreError> {
        let path = self.artifact_path(target);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("read", &path, e)),
        }
    }

    async fn mark_stale(&self, target: &BuildTarget) -> Result<(), CoreError> {
        let marker = self.stale_path(target);
        if let Some(parent) = marker.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create dir", parent, e))?;
        }
        tokio::fs::write(&marker, b"")
            .await
            .map_err(|e| io_err("write", &marker, e))
    }

    async fn is_stale(&self, target: &BuildTarget) -> Result<bool, CoreError> {
        let marker = self.stale_path(target);
        match tokio::fs::metadata(&marker).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err("stat", &marker, e)),
        }
    }
}
