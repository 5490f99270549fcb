#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for scene detection and lossless splitting.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with hard timeouts
//! - Progress parsing from `-progress pipe:2`
//! - FFprobe-based media probing and input validation
//! - Content-based shot boundary detection over decoded frames
//! - Stream-copy splitting and canonical scene file naming
//!
//! Stages talk to the tools through [`MediaBackend`], so they can be
//! driven by a scripted backend in tests.

pub mod backend;
pub mod command;
pub mod detect;
pub mod error;
pub mod fs_utils;
pub mod normalize;
pub mod probe;
pub mod progress;
pub mod split;
pub mod validate;

pub use backend::{FfmpegBackend, MediaBackend};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detect::{detect, DetectOptions, DetectProgress, Frame, FrameSource, PixelLayout, SceneDetector};
pub use error::{MediaError, MediaResult};
pub use normalize::normalize;
pub use probe::probe_media;
pub use progress::FfmpegProgress;
pub use split::{split, SplitOptions};
pub use validate::{validate, ValidationLimits};
