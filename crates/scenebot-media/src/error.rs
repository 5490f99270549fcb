//! Error types for media operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use scenebot_models::FailureKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No access to video file: {0}")]
    NotReadable(PathBuf),

    #[error("Unsupported video format '{extension}'. Supported formats: {supported}")]
    UnsupportedFormat { extension: String, supported: String },

    #[error("Video file too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Could not open video: {0}")]
    UnreadableMedia(String),

    #[error("Invalid video file: could not determine duration (fps={frame_rate}, frames={frame_count})")]
    InvalidDuration { frame_rate: f64, frame_count: u64 },

    #[error("Video too short: {duration:.2}s < {min:.2}s")]
    TooShort { duration: f64, min: f64 },

    #[error("No scene changes detected")]
    NoScenesDetected,

    #[error("Scene detection timed out after {}s", .0.as_secs())]
    DetectionTimeout(Duration),

    #[error("Video splitting timed out after {}s", .0.as_secs())]
    SplitTimeout(Duration),

    #[error("Splitting produced {found} scene files, expected {expected}")]
    IncompleteSplit { expected: usize, found: usize },

    #[error("No scene files were produced")]
    NoScenesProduced,

    #[error("Operation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an unreadable media error.
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::UnreadableMedia(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Failure kind reported to callers.
    pub fn kind(&self) -> FailureKind {
        match self {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => FailureKind::ToolMissing,
            MediaError::FfmpegFailed { .. } => FailureKind::ProcessFailed,
            MediaError::FileNotFound(_) => FailureKind::NotFound,
            MediaError::NotReadable(_) => FailureKind::NotReadable,
            MediaError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
            MediaError::TooLarge { .. } => FailureKind::TooLarge,
            MediaError::UnreadableMedia(_) | MediaError::InvalidDuration { .. } => {
                FailureKind::Unreadable
            }
            MediaError::TooShort { .. } => FailureKind::TooShort,
            MediaError::NoScenesDetected => FailureKind::NoScenesDetected,
            MediaError::DetectionTimeout(_) => FailureKind::DetectionTimeout,
            MediaError::SplitTimeout(_) => FailureKind::SplitTimeout,
            MediaError::IncompleteSplit { .. } => FailureKind::IncompleteSplit,
            MediaError::NoScenesProduced => FailureKind::NoScenesProduced,
            MediaError::Timeout(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            MediaError::Timeout(_) | MediaError::DetectionTimeout(_) | MediaError::SplitTimeout(_)
        )
    }
}
