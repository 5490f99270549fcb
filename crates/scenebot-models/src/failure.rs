//! Pipeline stages and the structured failure record returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of the scene pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Downloading and concatenating chunks (chunked inputs only)
    Reassembling,
    /// Checking the input file
    Validating,
    /// Running shot-boundary detection
    Detecting,
    /// Cutting the source into scene files
    Splitting,
    /// Renaming scene files into the canonical scheme
    Normalizing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Reassembling => "reassembling",
            Stage::Validating => "validating",
            Stage::Detecting => "detecting",
            Stage::Splitting => "splitting",
            Stage::Normalizing => "normalizing",
        }
    }

    /// Human-readable label passed to progress sinks.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Reassembling => "Downloading video in parts",
            Stage::Validating => "Reading video metadata",
            Stage::Detecting => "Detecting scenes",
            Stage::Splitting => "Splitting into scenes",
            Stage::Normalizing => "Finalizing scene files",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    NotReadable,
    UnsupportedFormat,
    TooLarge,
    Unreadable,
    TooShort,
    NoScenesDetected,
    DetectionTimeout,
    SplitTimeout,
    IncompleteSplit,
    NoScenesProduced,
    NoDataReceived,
    ChunkDownloadFailed,
    ReassemblyIoFailure,
    /// The transport refused to hand the file over in one piece or in chunks
    TooLargeForDirectTransfer,
    ReassemblyTimeout,
    JobTimeout,
    /// FFmpeg or FFprobe is not installed
    ToolMissing,
    /// An external process exited unsuccessfully
    ProcessFailed,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::NotReadable => "not_readable",
            FailureKind::UnsupportedFormat => "unsupported_format",
            FailureKind::TooLarge => "too_large",
            FailureKind::Unreadable => "unreadable",
            FailureKind::TooShort => "too_short",
            FailureKind::NoScenesDetected => "no_scenes_detected",
            FailureKind::DetectionTimeout => "detection_timeout",
            FailureKind::SplitTimeout => "split_timeout",
            FailureKind::IncompleteSplit => "incomplete_split",
            FailureKind::NoScenesProduced => "no_scenes_produced",
            FailureKind::NoDataReceived => "no_data_received",
            FailureKind::ChunkDownloadFailed => "chunk_download_failed",
            FailureKind::ReassemblyIoFailure => "reassembly_io_failure",
            FailureKind::TooLargeForDirectTransfer => "too_large_for_direct_transfer",
            FailureKind::ReassemblyTimeout => "reassembly_timeout",
            FailureKind::JobTimeout => "job_timeout",
            FailureKind::ToolMissing => "tool_missing",
            FailureKind::ProcessFailed => "process_failed",
            FailureKind::Internal => "internal",
        }
    }

    /// Whether the job ran out of time rather than hitting a logical failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FailureKind::DetectionTimeout
                | FailureKind::SplitTimeout
                | FailureKind::ReassemblyTimeout
                | FailureKind::JobTimeout
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure record handed to the calling layer.
///
/// `stage` and `kind` are enough to pick a localized message; `message`
/// carries the technical detail for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed ({kind}): {message}")]
pub struct JobFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind.is_timeout()
    }
}
