//! Media probe results.

use serde::{Deserialize, Serialize};

/// Stream properties read from a media file.
///
/// `duration_seconds` is always derived from `frame_count / frame_rate`
/// so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Duration in seconds
    pub duration_seconds: f64,
    /// Frame rate (fps)
    pub frame_rate: f64,
    /// Number of video frames
    pub frame_count: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl MediaProbe {
    /// Build a probe from raw stream values.
    pub fn from_stream(frame_rate: f64, frame_count: u64, width: u32, height: u32) -> Self {
        let duration_seconds = if frame_rate > 0.0 {
            frame_count as f64 / frame_rate
        } else {
            0.0
        };

        Self {
            duration_seconds,
            frame_rate,
            frame_count,
            width,
            height,
        }
    }

    /// A probe is usable only when both frame rate and frame count are positive.
    pub fn is_valid(&self) -> bool {
        self.frame_rate > 0.0 && self.frame_rate.is_finite() && self.frame_count > 0
    }

    /// Convert a duration into a whole number of frames, rounding up.
    ///
    /// Rounding up keeps scenes measured in frames at least as long as the
    /// requested duration in seconds.
    pub fn frames_for(&self, seconds: f64) -> u64 {
        if !self.is_valid() || seconds <= 0.0 {
            return 1;
        }
        ((seconds * self.frame_rate) - 1e-9).ceil().max(1.0) as u64
    }

    /// Timestamp of a frame index in seconds.
    pub fn frame_time(&self, frame: u64) -> f64 {
        if self.frame_rate > 0.0 {
            frame as f64 / self.frame_rate
        } else {
            0.0
        }
    }
}
