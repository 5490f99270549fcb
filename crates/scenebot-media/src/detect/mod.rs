//! Shot boundary detection.
//!
//! Frames are decoded at a reduced resolution and scored one at a time
//! against their predecessor; see [`SceneDetector`] for how boundaries are
//! placed.

mod boundary;
mod content;
mod frame;

pub use boundary::SceneDetector;
pub use content::{rgb_to_hsv, ContentScorer};
pub use frame::{analysis_dimensions, frame_size, FfmpegFrameSource, Frame, FrameSource, PixelLayout};

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use scenebot_models::{MediaProbe, SceneInterval};

use crate::backend::MediaBackend;
use crate::error::{MediaError, MediaResult};

/// Tuning for one detection run.
#[derive(Debug, Clone)]
pub struct DetectOptions {
    /// Minimum content score for a cut
    pub threshold: f64,
    /// Minimum scene length in frames
    pub min_scene_len_frames: u64,
    /// Compare luminance only instead of full HSV
    pub luma_only: bool,
    /// Maximum width frames are decoded at
    pub analysis_width: u32,
    /// Emit progress at least this often
    pub progress_every_frames: u64,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            threshold: 27.0,
            min_scene_len_frames: 60,
            luma_only: false,
            analysis_width: 320,
            progress_every_frames: 100,
        }
    }
}

impl DetectOptions {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_min_scene_len_frames(mut self, frames: u64) -> Self {
        self.min_scene_len_frames = frames;
        self
    }

    pub fn with_luma_only(mut self, luma_only: bool) -> Self {
        self.luma_only = luma_only;
        self
    }

    pub fn with_analysis_width(mut self, width: u32) -> Self {
        self.analysis_width = width;
        self
    }

    pub fn with_progress_every_frames(mut self, frames: u64) -> Self {
        self.progress_every_frames = frames.max(1);
        self
    }

    fn pixel_layout(&self) -> PixelLayout {
        if self.luma_only {
            PixelLayout::Gray8
        } else {
            PixelLayout::Rgb24
        }
    }
}

/// Detection progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectProgress {
    pub frames_processed: u64,
    pub total_frames: u64,
    pub scenes_found: usize,
}

impl DetectProgress {
    /// Fraction of frames processed, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.frames_processed as f64 / self.total_frames as f64).clamp(0.0, 1.0)
    }
}

/// Detect scenes in `path` within `budget`.
///
/// When the budget elapses the decoder is stopped and reaped before
/// [`MediaError::DetectionTimeout`] is returned; no progress is reported
/// after that point.
pub async fn detect(
    backend: &dyn MediaBackend,
    path: &Path,
    probe: &MediaProbe,
    options: &DetectOptions,
    budget: Duration,
    on_progress: &(dyn Fn(DetectProgress) + Send + Sync),
) -> MediaResult<Vec<SceneInterval>> {
    let start = Instant::now();
    let mut source = backend
        .open_frames(path, probe, options.pixel_layout(), options.analysis_width)
        .await?;

    let mut detector = SceneDetector::new(
        options.threshold,
        options.min_scene_len_frames,
        options.luma_only,
    );

    let outcome = {
        let scan = scan(source.as_mut(), &mut detector, probe, options, on_progress);
        tokio::time::timeout(budget, scan).await
    };
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            source.abort().await;
            return Err(e);
        }
        Err(_) => {
            warn!(
                "Scene detection exceeded {:?} after {} frames, stopping decoder",
                budget,
                detector.frames_seen()
            );
            source.abort().await;
            return Err(MediaError::DetectionTimeout(budget));
        }
    }

    let frames = detector.frames_seen();
    let intervals = detector.finish(probe)?;
    info!(
        "Detected {} scenes in {} frames ({:.1}s)",
        intervals.len(),
        frames,
        start.elapsed().as_secs_f64()
    );
    Ok(intervals)
}

async fn scan(
    source: &mut dyn FrameSource,
    detector: &mut SceneDetector,
    probe: &MediaProbe,
    options: &DetectOptions,
    on_progress: &(dyn Fn(DetectProgress) + Send + Sync),
) -> MediaResult<()> {
    let every = options.progress_every_frames.max(1);
    let total_frames = probe.frame_count;
    let report = |detector: &SceneDetector| {
        on_progress(DetectProgress {
            frames_processed: detector.frames_seen(),
            total_frames,
            scenes_found: detector.scenes_found(),
        })
    };

    while let Some(frame) = source.next_frame().await? {
        let boundary = detector.push(&frame);
        if boundary.is_some() || detector.frames_seen() % every == 0 {
            report(detector);
        }
    }

    source.finish().await?;
    report(detector);
    Ok(())
}
