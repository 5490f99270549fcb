//! Lossless splitting of a source video into one file per scene.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use scenebot_models::{index_width, SceneInterval};

use crate::backend::MediaBackend;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{extension_of, list_files_with_extension, normalize_extension};

/// Options for one split run.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Extension of the scene files; defaults to the source's
    pub extension: Option<String>,
    /// Budget for all cuts together
    pub timeout: Duration,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            extension: None,
            timeout: Duration::from_secs(600),
        }
    }
}

impl SplitOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

/// Output path of the cut for `interval`.
pub fn split_file_path(
    output_dir: &Path,
    stem: &str,
    interval: &SceneInterval,
    width: usize,
    extension: &str,
) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    output_dir.join(format!(
        "{stem}-Scene-{:0width$}.{extension}",
        interval.index
    ))
}

/// Cut `source` into one stream-copied file per interval in `output_dir`.
///
/// All cuts share `options.timeout`; the running cut is stopped when the
/// budget runs out and [`MediaError::SplitTimeout`] is returned. Files left
/// behind by a failed or timed-out split must be discarded by the caller.
/// On success the number of scene files in `output_dir` is checked against
/// `intervals.len()`.
pub async fn split(
    backend: &dyn MediaBackend,
    source: &Path,
    intervals: &[SceneInterval],
    output_dir: &Path,
    options: &SplitOptions,
    on_progress: &(dyn Fn(usize, usize) + Send + Sync),
) -> MediaResult<usize> {
    let start = Instant::now();
    let deadline = start + options.timeout;
    let total = intervals.len();

    let extension = options
        .extension
        .as_deref()
        .map(normalize_extension)
        .or_else(|| extension_of(source))
        .unwrap_or_else(|| ".mp4".to_string());
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let width = index_width(total);

    tokio::fs::create_dir_all(output_dir).await?;
    info!(
        "Splitting {} into {} scenes ({:?} budget)",
        source.display(),
        total,
        options.timeout
    );

    for (done, interval) in intervals.iter().enumerate() {
        if interval.is_degenerate() {
            warn!(
                "Skipping scene {} with empty interval {:.3}s-{:.3}s",
                interval.index, interval.start_seconds, interval.end_seconds
            );
            on_progress(done + 1, total);
            continue;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(MediaError::SplitTimeout(options.timeout));
        }

        let output = split_file_path(output_dir, &stem, interval, width, &extension);
        debug!(
            "Cutting scene {}/{}: {:.3}s-{:.3}s -> {}",
            interval.index,
            total,
            interval.start_seconds,
            interval.end_seconds,
            output.display()
        );

        backend
            .cut(source, interval, &output, remaining)
            .await
            .map_err(|e| match e {
                MediaError::Timeout(_) => MediaError::SplitTimeout(options.timeout),
                other => other,
            })?;

        on_progress(done + 1, total);
    }

    let found = list_files_with_extension(output_dir, &extension).await?.len();
    if found != total {
        return Err(MediaError::IncompleteSplit {
            expected: total,
            found,
        });
    }

    info!(
        "Split {} scenes in {:.1}s",
        found,
        start.elapsed().as_secs_f64()
    );
    Ok(found)
}
