//! Content-difference metric between consecutive frames.
//!
//! Frames are compared in HSV space (8-bit OpenCV convention: H 0..180,
//! S and V 0..255). The score of a frame is the mean absolute per-pixel
//! difference to the previous frame, averaged over the compared planes, so
//! it ranges 0..255 and a hard cut between unrelated shots usually lands
//! well above 27.

use super::frame::{Frame, PixelLayout};

/// Scores each frame against its predecessor.
///
/// Only the previous frame's planes are kept, so memory stays at one
/// frame regardless of video length.
#[derive(Debug, Default)]
pub struct ContentScorer {
    luma_only: bool,
    previous: Option<Vec<Vec<u8>>>,
}

impl ContentScorer {
    pub fn new(luma_only: bool) -> Self {
        Self {
            luma_only,
            previous: None,
        }
    }

    /// Score `frame` against the previous one.
    ///
    /// Returns `None` for the first frame, and whenever the frame shape
    /// changes so that no comparison is possible.
    pub fn score(&mut self, frame: &Frame) -> Option<f64> {
        let planes = frame_planes(frame, self.luma_only);

        let score = match &self.previous {
            Some(previous)
                if previous.len() == planes.len()
                    && previous.iter().zip(&planes).all(|(a, b)| a.len() == b.len()) =>
            {
                let total: f64 = previous
                    .iter()
                    .zip(&planes)
                    .map(|(a, b)| mean_abs_diff(a, b))
                    .sum();
                Some(total / planes.len() as f64)
            }
            _ => None,
        };

        self.previous = Some(planes);
        score
    }
}

/// Planes compared for a frame: H, S, V, or just luminance.
fn frame_planes(frame: &Frame, luma_only: bool) -> Vec<Vec<u8>> {
    match frame.layout {
        PixelLayout::Gray8 => vec![frame.data.clone()],
        PixelLayout::Rgb24 => {
            let pixels = frame.pixel_count();
            let mut hue = Vec::with_capacity(if luma_only { 0 } else { pixels });
            let mut sat = Vec::with_capacity(if luma_only { 0 } else { pixels });
            let mut val = Vec::with_capacity(pixels);

            for px in frame.data.chunks_exact(3) {
                let (h, s, v) = rgb_to_hsv(px[0], px[1], px[2]);
                if !luma_only {
                    hue.push(h);
                    sat.push(s);
                }
                val.push(v);
            }

            if luma_only {
                vec![val]
            } else {
                vec![hue, sat, val]
            }
        }
    }
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    sum as f64 / a.len() as f64
}

/// Convert one RGB pixel to 8-bit HSV (H halved into 0..180).
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);

    let v = max;
    let s = if max == 0 {
        0
    } else {
        (255.0 * delta / f32::from(max)).round() as u8
    };

    if delta == 0.0 {
        return (0, s, v);
    }

    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let mut h = if max as f32 == r {
        60.0 * (g - b) / delta
    } else if max as f32 == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u16 % 180;
    (h as u8, s, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        assert_eq!(rgb_to_hsv(128, 128, 128), (0, 0, 128));
        assert_eq!(rgb_to_hsv(0, 0, 0), (0, 0, 0));
    }

    #[test]
    fn test_first_frame_has_no_score() {
        let mut scorer = ContentScorer::new(false);
        assert!(scorer.score(&Frame::solid(8, 8, PixelLayout::Rgb24, 10)).is_none());
        assert_eq!(scorer.score(&Frame::solid(8, 8, PixelLayout::Rgb24, 10)), Some(0.0));
    }

    #[test]
    fn test_luma_difference() {
        let mut scorer = ContentScorer::new(true);
        scorer.score(&Frame::solid(8, 8, PixelLayout::Gray8, 20));
        let score = scorer.score(&Frame::solid(8, 8, PixelLayout::Gray8, 220)).unwrap();
        assert!((score - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_hsv_score_averages_channels() {
        let red = Frame::new(1, 1, PixelLayout::Rgb24, vec![255, 0, 0]).unwrap();
        let blue = Frame::new(1, 1, PixelLayout::Rgb24, vec![0, 0, 255]).unwrap();

        let mut scorer = ContentScorer::new(false);
        scorer.score(&red);
        // Hue moves 0 -> 120, saturation and value stay at 255
        let score = scorer.score(&blue).unwrap();
        assert!((score - 40.0).abs() < 1e-9);

        let mut luma = ContentScorer::new(true);
        luma.score(&red);
        assert_eq!(luma.score(&blue), Some(0.0));
    }

    #[test]
    fn test_shape_change_resets_comparison() {
        let mut scorer = ContentScorer::new(true);
        scorer.score(&Frame::solid(8, 8, PixelLayout::Gray8, 0));
        assert!(scorer.score(&Frame::solid(4, 4, PixelLayout::Gray8, 255)).is_none());
    }
}
