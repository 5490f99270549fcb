//! Per-job scratch directories.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use scenebot_media::fs_utils::{directory_size, normalize_extension};
use scenebot_models::JobId;

use crate::error::PipelineResult;

const SCENES_DIR: &str = "scenes";
const CHUNKS_DIR: &str = "chunks";
const COMBINED_STEM: &str = "combined";

/// Scratch directory owned by exactly one job.
///
/// Laid out as `<base>/<job_id>/` with a `scenes/` subdirectory for split
/// output. The tree is deleted by [`WorkingDirectory::remove`], or by
/// `Drop` if the owner goes away without calling it.
#[derive(Debug)]
pub struct WorkingDirectory {
    root: PathBuf,
    removed: bool,
}

impl WorkingDirectory {
    /// Create a fresh directory for `job_id` under `base`.
    ///
    /// Fails if the directory already exists.
    pub async fn create(base: &Path, job_id: &JobId) -> PipelineResult<Self> {
        let root = base.join(job_id.as_str());
        fs::create_dir_all(base).await?;
        fs::create_dir(&root).await?;

        // From here on a failure drops `workdir`, which removes the tree
        let workdir = Self {
            root,
            removed: false,
        };
        fs::create_dir(workdir.scenes_dir()).await?;

        debug!("Created working directory {}", workdir.root.display());
        Ok(workdir)
    }

    /// Delete job directories left under `base` by an earlier process.
    ///
    /// Only entries named like generated job IDs are touched. Returns the
    /// number of directories removed.
    pub async fn sweep_stale(base: &Path) -> PipelineResult<usize> {
        let mut entries = match fs::read_dir(base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        let mut freed = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_job_dir = entry.file_type().await.is_ok_and(|t| t.is_dir())
                && entry.file_name().to_str().is_some_and(JobId::is_generated);
            if !is_job_dir {
                continue;
            }

            let size = directory_size(&path).await;
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!("Removed stale working directory {}", path.display());
                    removed += 1;
                    freed += size;
                }
                Err(e) => warn!(
                    "Failed to remove stale working directory {}: {}",
                    path.display(),
                    e
                ),
            }
        }

        if removed > 0 {
            info!(
                "Swept {} stale working directories under {} ({:.1} MB freed)",
                removed,
                base.display(),
                freed as f64 / (1024.0 * 1024.0)
            );
        }
        Ok(removed)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.root.join(SCENES_DIR)
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.root.join(CHUNKS_DIR)
    }

    /// Path of the reassembled input, e.g. `combined.mp4`.
    pub fn combined_path(&self, extension: &str) -> PathBuf {
        self.root
            .join(format!("{COMBINED_STEM}{}", normalize_extension(extension)))
    }

    /// Delete the whole tree, logging how much space was freed.
    pub async fn remove(mut self) {
        self.removed = true;
        let size = directory_size(&self.root).await;
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => info!(
                "Removed working directory {} ({:.1} MB freed)",
                self.root.display(),
                size as f64 / (1024.0 * 1024.0)
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                self.root.display(),
                e
            ),
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed working directory {} on drop", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove working directory {} on drop: {}",
                self.root.display(),
                e
            ),
        }
    }
}
