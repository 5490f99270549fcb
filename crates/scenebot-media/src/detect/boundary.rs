//! Boundary placement and scene interval construction.

use tracing::debug;

use scenebot_models::{MediaProbe, SceneInterval};

use super::content::ContentScorer;
use super::frame::Frame;
use crate::error::{MediaError, MediaResult};

/// Frame-at-a-time shot boundary detector.
///
/// A boundary is declared at frame `i` when its content score exceeds the
/// threshold and at least `min_scene_len` frames have passed since the
/// previous boundary (or since frame 0). Every scene except the last one
/// is therefore at least `min_scene_len` frames long; the last scene ends
/// wherever the source ends.
#[derive(Debug)]
pub struct SceneDetector {
    threshold: f64,
    min_scene_len: u64,
    scorer: ContentScorer,
    frames_seen: u64,
    last_boundary: u64,
    boundaries: Vec<u64>,
}

impl SceneDetector {
    pub fn new(threshold: f64, min_scene_len_frames: u64, luma_only: bool) -> Self {
        Self {
            threshold,
            min_scene_len: min_scene_len_frames.max(1),
            scorer: ContentScorer::new(luma_only),
            frames_seen: 0,
            last_boundary: 0,
            boundaries: Vec::new(),
        }
    }

    /// Feed the next frame; returns its index if it starts a new scene.
    pub fn push(&mut self, frame: &Frame) -> Option<u64> {
        let index = self.frames_seen;
        self.frames_seen += 1;

        let score = self.scorer.score(frame)?;
        if score <= self.threshold {
            return None;
        }

        let since_last = index - self.last_boundary;
        if since_last < self.min_scene_len {
            debug!(
                "Ignoring boundary at frame {} (score={:.2}, only {} frames after previous)",
                index, score, since_last
            );
            return None;
        }

        debug!(
            "Scene boundary at frame {} (score={:.2}, threshold={:.2})",
            index, score, self.threshold
        );
        self.boundaries.push(index);
        self.last_boundary = index;
        Some(index)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Number of scenes implied by the boundaries found so far.
    pub fn scenes_found(&self) -> usize {
        self.boundaries.len() + 1
    }

    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    /// Build the ordered, gap-free interval list covering the whole source.
    ///
    /// A source where no boundary was ever found yields
    /// [`MediaError::NoScenesDetected`].
    pub fn finish(self, probe: &MediaProbe) -> MediaResult<Vec<SceneInterval>> {
        if self.boundaries.is_empty() {
            return Err(MediaError::NoScenesDetected);
        }

        // A frame count estimated from container duration can undershoot
        let end = probe
            .duration_seconds
            .max(probe.frame_time(self.frames_seen));

        let starts: Vec<u64> = std::iter::once(0).chain(self.boundaries.iter().copied()).collect();

        let intervals = starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end_seconds = match starts.get(i + 1) {
                    Some(&next) => probe.frame_time(next),
                    None => end,
                };
                SceneInterval::new(i as u32 + 1, probe.frame_time(start), end_seconds)
            })
            .collect();

        Ok(intervals)
    }
}
