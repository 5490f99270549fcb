//! Scene job worker.
//!
//! This crate provides:
//! - Pipeline configuration from the environment
//! - Chunked reassembly of large remote inputs with bounded retry
//! - Per-job working directories with guaranteed cleanup
//! - Job-wide progress composed from stage progress
//! - The orchestrator driving validate, detect, split and normalize

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod reassemble;
pub mod retry;
pub mod workdir;

pub use config::{PipelineConfig, StageTimeouts};
pub use error::{PipelineError, PipelineResult};
pub use logging::{init_tracing, JobLogger};
pub use memory::{log_disk_space, DiskSpace, MemoryMonitor};
pub use orchestrator::{CompletedJob, JobInput, ScenePipeline};
pub use progress::{ProgressPlan, ProgressReporter, ProgressSink};
pub use reassemble::{ChunkReassembler, ChunkSource, FetchError, ReassemblyProgress};
pub use retry::{retry_async, retry_async_if, RetryConfig, RetryResult};
pub use workdir::WorkingDirectory;
