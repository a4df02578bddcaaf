//! Filesystem media storage.
//!
//! Uploads are staged under `<root>/staging/<id>/` and promoted into
//! `<root>/src/` on commit. Commit and discard are the two ends of the
//! compensating cleanup around the duplicate check.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use sumi_core::error::CoreError;
use sumi_core::ports::{MediaStore, StagedMedia};

pub struct FsMediaStore {
    root: PathBuf,
    sequence: AtomicU64,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), sequence: AtomicU64::new(0) }
    }

    fn staging_dir(&self, id: &str) -> PathBuf {
        self.root.join("staging").join(id)
    }

    fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        // Unique enough across restarts: wall clock plus an in-process
        // sequence number.
        format!("{}-{}", chrono::Utc::now().timestamp_micros(), seq)
    }
}

fn io_err(op: &str, path: &Path, e: std::io::Error) -> CoreError {
    CoreError::Resource(format!("{op} {} failed: {e}", path.display()))
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn stage(
        &self,
        name: &str,
        data: &[u8],
        thumb: Option<&[u8]>,
    ) -> Result<StagedMedia, CoreError> {
        let id = self.next_id();
        let dir = self.staging_dir(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err("create dir", &dir, e))?;

        let file_path = dir.join(sanitize(name));
        tokio::fs::write(&file_path, data)
            .await
            .map_err(|e| io_err("write", &file_path, e))?;
        if let Some(thumb) = thumb {
            let thumb_path = dir.join(format!("t_{}", sanitize(name)));
            tokio::fs::write(&thumb_path, thumb)
                .await
                .map_err(|e| io_err("write", &thumb_path, e))?;
        }
        Ok(StagedMedia { id, size: data.len() as u64 })
    }

    async fn commit(
        &self,
        staged: &StagedMedia,
    ) -> Result<(String, Option<String>), CoreError> {
        let dir = self.staging_dir(&staged.id);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_err("read dir", &dir, e))?;

        let mut file: Option<String> = None;
        let mut thumb: Option<String> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err("read dir", &dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("t_") {
                thumb = Some(name);
            } else {
                file = Some(name);
            }
        }
        let file = file.ok_or_else(|| {
            CoreError::Resource(format!("staged media {} not found", staged.id))
        })?;

        let dest_dir = self.root.join("src").join(&staged.id);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| io_err("create dir", &dest_dir, e))?;

        let final_path = format!("src/{}/{}", staged.id, file);
        tokio::fs::rename(dir.join(&file), self.root.join(&final_path))
            .await
            .map_err(|e| io_err("rename", &dir, e))?;

        let final_thumb = match thumb {
            Some(thumb) => {
                let path = format!("src/{}/{}", staged.id, thumb);
                tokio::fs::rename(dir.join(&thumb), self.root.join(&path))
                    .await
                    .map_err(|e| io_err("rename", &dir, e))?;
                Some(path)
            }
            None => None,
        };

        let _ = tokio::fs::remove_dir(&dir).await;
        Ok((final_path, final_thumb))
    }

    async fn discard(&self, staged: &StagedMedia) -> Result<(), CoreError> {
        let dir = self.staging_dir(&staged.id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove", &dir, e)),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), CoreError> {
        let full = self.root.join(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove", &full, e)),
        }
    }
}

/// Keep only the final path component and drop anything shell-hostile.
fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        format!("file{cleaned}")
    } else {
        cleaned
    }
}
