//! Pipeline error types.

use std::time::Duration;
use thiserror::Error;

use scenebot_media::MediaError;
use scenebot_models::{FailureKind, InvalidTransition, JobFailure, Stage};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("No data received from the source")]
    NoDataReceived,

    #[error("Failed to download chunk {sequence} after {attempts} attempts: {message}")]
    ChunkDownloadFailed {
        sequence: u64,
        attempts: u32,
        message: String,
    },

    #[error("File is too big to be transferred directly")]
    TooLargeForDirectTransfer,

    #[error("Reassembly timed out after {}s", .0.as_secs())]
    ReassemblyTimeout(Duration),

    #[error("Failed to write reassembled file: {0}")]
    ReassemblyIo(#[source] std::io::Error),

    #[error("Job timed out after {}s", .0.as_secs())]
    JobTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Failure kind reported to callers.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Media(e) => e.kind(),
            PipelineError::NoDataReceived => FailureKind::NoDataReceived,
            PipelineError::ChunkDownloadFailed { .. } => FailureKind::ChunkDownloadFailed,
            PipelineError::TooLargeForDirectTransfer => FailureKind::TooLargeForDirectTransfer,
            PipelineError::ReassemblyTimeout(_) => FailureKind::ReassemblyTimeout,
            PipelineError::ReassemblyIo(_) => FailureKind::ReassemblyIoFailure,
            PipelineError::JobTimeout(_) => FailureKind::JobTimeout,
            PipelineError::Config(_) | PipelineError::InvalidState(_) | PipelineError::Io(_) => {
                FailureKind::Internal
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind().is_timeout()
    }

    /// Convert into the outward failure record for `stage`.
    pub fn into_failure(self, stage: Stage) -> JobFailure {
        JobFailure::new(stage, self.kind(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            PipelineError::from(MediaError::NoScenesDetected).kind(),
            FailureKind::NoScenesDetected
        );
        assert_eq!(
            PipelineError::TooLargeForDirectTransfer.kind(),
            FailureKind::TooLargeForDirectTransfer
        );
        assert_eq!(
            PipelineError::ReassemblyIo(std::io::Error::other("disk full")).kind(),
            FailureKind::ReassemblyIoFailure
        );
    }

    #[test]
    fn test_timeouts_are_distinguishable() {
        assert!(PipelineError::JobTimeout(Duration::from_secs(1)).is_timeout());
        assert!(PipelineError::from(MediaError::SplitTimeout(Duration::from_secs(1))).is_timeout());
        assert!(!PipelineError::NoDataReceived.is_timeout());
    }

    #[test]
    fn test_into_failure() {
        let failure = PipelineError::from(MediaError::IncompleteSplit {
            expected: 3,
            found: 2,
        })
        .into_failure(Stage::Splitting);

        assert_eq!(failure.stage, Stage::Splitting);
        assert_eq!(failure.kind, FailureKind::IncompleteSplit);
        assert!(failure.message.contains("expected 3"));
    }
}
