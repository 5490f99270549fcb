//! Shared data models for the SceneBot scene pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media probes and scene intervals
//! - Scene files and the canonical `scene-NNN.<ext>` naming contract
//! - Download chunks
//! - Pipeline stages, failure kinds and the job state machine

pub mod chunk;
pub mod failure;
pub mod job;
pub mod probe;
pub mod scene;
pub mod state;

// Re-export common types
pub use chunk::Chunk;
pub use failure::{FailureKind, JobFailure, Stage};
pub use job::JobId;
pub use probe::MediaProbe;
pub use scene::{index_width, parse_scene_index, scene_file_name, SceneFile, SceneInterval};
pub use state::{InvalidTransition, PipelineState};
