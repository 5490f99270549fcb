//! Input validation before any expensive work starts.

use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use scenebot_models::MediaProbe;

use crate::backend::MediaBackend;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{extension_of, normalize_extension};

/// Acceptance limits for input videos.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    /// Accepted extensions, lowercase with leading dot
    pub supported_extensions: Vec<String>,
    /// Largest accepted file
    pub max_input_size_bytes: u64,
    /// Shortest accepted duration
    pub min_duration_seconds: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            supported_extensions: [".mp4", ".avi", ".mkv", ".mov"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_input_size_bytes: 2000 * 1024 * 1024,
            min_duration_seconds: 2.0,
        }
    }
}

impl ValidationLimits {
    fn supports(&self, extension: &str) -> bool {
        self.supported_extensions
            .iter()
            .any(|e| normalize_extension(e) == extension)
    }
}

/// Check that `path` is a video the pipeline can process.
///
/// Checks run cheapest first and stop at the first failure: file exists,
/// file opens, extension, size, probe, duration. Nothing is modified, so
/// the result for an unchanged file is always the same.
pub async fn validate(
    path: &Path,
    limits: &ValidationLimits,
    backend: &dyn MediaBackend,
) -> MediaResult<MediaProbe> {
    let metadata = match fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(MediaError::FileNotFound(path.to_path_buf())),
    };

    if fs::File::open(path).await.is_err() {
        return Err(MediaError::NotReadable(path.to_path_buf()));
    }

    let extension = extension_of(path).unwrap_or_default();
    if !limits.supports(&extension) {
        return Err(MediaError::UnsupportedFormat {
            extension,
            supported: limits.supported_extensions.join(", "),
        });
    }

    let size = metadata.len();
    if size > limits.max_input_size_bytes {
        return Err(MediaError::TooLarge {
            size,
            max: limits.max_input_size_bytes,
        });
    }

    let probe = backend.probe(path).await.map_err(|e| match e {
        MediaError::Io(_) | MediaError::JsonParse(_) => MediaError::unreadable(e.to_string()),
        other => other,
    })?;
    if !probe.is_valid() {
        return Err(MediaError::InvalidDuration {
            frame_rate: probe.frame_rate,
            frame_count: probe.frame_count,
        });
    }

    if probe.duration_seconds < limits.min_duration_seconds {
        return Err(MediaError::TooShort {
            duration: probe.duration_seconds,
            min: limits.min_duration_seconds,
        });
    }

    debug!(
        "Probe: {}x{} @ {:.3}fps, {} frames",
        probe.width, probe.height, probe.frame_rate, probe.frame_count
    );
    info!(
        "Validated {} ({} bytes, {:.2}s)",
        path.display(),
        size,
        probe.duration_seconds
    );
    Ok(probe)
}
