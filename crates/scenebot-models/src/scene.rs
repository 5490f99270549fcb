//! Scene intervals and scene files.
//!
//! Scene files handed to delivery code are always named `scene-NNN.<ext>`,
//! 1-based and contiguous, with `NNN` zero-padded to at least three digits.
//! Because every name in a set uses the same width, lexicographic order is
//! index order.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of canonical scene file names.
pub const SCENE_FILE_PREFIX: &str = "scene-";

/// A detected scene, `[start_seconds, end_seconds)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneInterval {
    /// 1-based, contiguous index
    pub index: u32,
    /// Start time in seconds (inclusive)
    pub start_seconds: f64,
    /// End time in seconds (exclusive)
    pub end_seconds: f64,
}

impl SceneInterval {
    pub fn new(index: u32, start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            index,
            start_seconds,
            end_seconds,
        }
    }

    /// Duration of the scene in seconds.
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Whether the interval has no extent and cannot be cut.
    pub fn is_degenerate(&self) -> bool {
        self.duration() <= 0.0
    }
}

/// A scene clip on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFile {
    /// 1-based index, equal to the number in the file name
    pub index: u32,
    /// Absolute or workdir-relative path
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Digits used for scene numbers in a set of `count` files.
pub fn index_width(count: usize) -> usize {
    count.max(1).to_string().len().max(3)
}

/// Canonical file name for a scene, e.g. `scene-007.mp4`.
pub fn scene_file_name(index: u32, width: usize, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    format!("{SCENE_FILE_PREFIX}{index:0width$}.{extension}")
}

/// Extract the scene number from a canonical file name.
pub fn parse_scene_index(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(SCENE_FILE_PREFIX)?;
    let (digits, _ext) = rest.split_once('.')?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
