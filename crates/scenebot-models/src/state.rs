//! Pipeline state machine.
//!
//! ```text
//! [Reassembling] -> Validating -> Detecting -> Splitting -> Normalizing -> Done
//!        \______________\____________\___________\____________\--> Failed { stage, kind }
//! ```
//!
//! Transitions are strictly sequential. `Reassembling` is entered only for
//! chunked inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::failure::{FailureKind, Stage};

/// Current state of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Reassembling,
    Validating,
    Detecting,
    Splitting,
    Normalizing,
    Done,
    Failed { stage: Stage, kind: FailureKind },
}

/// Attempted to move a terminal state forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid pipeline transition from {from}")]
pub struct InvalidTransition {
    pub from: PipelineState,
}

impl PipelineState {
    /// Initial state for a job.
    pub fn initial(chunked: bool) -> Self {
        if chunked {
            PipelineState::Reassembling
        } else {
            PipelineState::Validating
        }
    }

    /// The stage this state represents, if it is not terminal.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Reassembling => Some(Stage::Reassembling),
            PipelineState::Validating => Some(Stage::Validating),
            PipelineState::Detecting => Some(Stage::Detecting),
            PipelineState::Splitting => Some(Stage::Splitting),
            PipelineState::Normalizing => Some(Stage::Normalizing),
            PipelineState::Done | PipelineState::Failed { .. } => None,
        }
    }

    /// Move to the next stage.
    pub fn advance(self) -> Result<Self, InvalidTransition> {
        let next = match self {
            PipelineState::Reassembling => PipelineState::Validating,
            PipelineState::Validating => PipelineState::Detecting,
            PipelineState::Detecting => PipelineState::Splitting,
            PipelineState::Splitting => PipelineState::Normalizing,
            PipelineState::Normalizing => PipelineState::Done,
            PipelineState::Done | PipelineState::Failed { .. } => {
                return Err(InvalidTransition { from: self })
            }
        };
        Ok(next)
    }

    /// Terminate the job in the current stage.
    pub fn fail(self, kind: FailureKind) -> Result<Self, InvalidTransition> {
        match self.stage() {
            Some(stage) => Ok(PipelineState::Failed { stage, kind }),
            None => Err(InvalidTransition { from: self }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed { stage, kind } => write!(f, "failed({stage}: {kind})"),
            other => match other.stage() {
                Some(stage) => write!(f, "{stage}"),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_input_sequence() {
        let mut state = PipelineState::initial(false);
        let mut stages = Vec::new();
        while let Some(stage) = state.stage() {
            stages.push(stage);
            state = state.advance().unwrap();
        }
        assert_eq!(
            stages,
            vec![Stage::Validating, Stage::Detecting, Stage::Splitting, Stage::Normalizing]
        );
        assert_eq!(state, PipelineState::Done);
    }

    #[test]
    fn test_chunked_input_starts_with_reassembly() {
        let state = PipelineState::initial(true);
        assert_eq!(state.stage(), Some(Stage::Reassembling));
        assert_eq!(state.advance().unwrap(), PipelineState::Validating);
    }

    #[test]
    fn test_fail_records_stage() {
        let state = PipelineState::Splitting.fail(FailureKind::SplitTimeout).unwrap();
        assert_eq!(
            state,
            PipelineState::Failed {
                stage: Stage::Splitting,
                kind: FailureKind::SplitTimeout
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        assert!(PipelineState::Done.advance().is_err());
        assert!(PipelineState::Done.fail(FailureKind::Internal).is_err());
        let failed = PipelineState::Detecting.fail(FailureKind::NoScenesDetected).unwrap();
        assert!(failed.advance().is_err());
    }
}
