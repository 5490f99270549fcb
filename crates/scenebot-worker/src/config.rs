//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use scenebot_media::fs_utils::normalize_extension;
use scenebot_media::{DetectOptions, ValidationLimits};
use scenebot_models::MediaProbe;

use crate::error::{PipelineError, PipelineResult};

/// Wall-clock budgets for each stage and for the whole job.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    /// Shot boundary detection
    pub detect: Duration,
    /// All cuts of one split together
    pub split: Duration,
    /// Downloading every chunk of one input
    pub reassemble: Duration,
    /// A single chunk fetch attempt
    pub chunk_fetch: Duration,
    /// The whole job, end to end
    pub job: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            detect: Duration::from_secs(1800),
            split: Duration::from_secs(600),
            reassemble: Duration::from_secs(3600),
            chunk_fetch: Duration::from_secs(300),
            job: Duration::from_secs(7200),
        }
    }
}

/// Pipeline configuration.
///
/// Built once per process and shared read-only between jobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Shortest scene kept as its own file (except the final one)
    pub min_scene_length_seconds: f64,
    /// Content score above which a frame starts a new scene
    pub detection_threshold: f64,
    /// Largest accepted input
    pub max_input_size_bytes: u64,
    /// Accepted input extensions, lowercase with leading dot
    pub supported_extensions: Vec<String>,
    /// Bytes requested per chunk fetch
    pub chunk_size_bytes: u64,
    /// Attempts per chunk before the download fails
    pub chunk_retry_attempts: u32,
    /// First backoff delay between chunk attempts
    pub chunk_retry_base_delay: Duration,
    /// Pause between consecutive chunk fetches
    pub inter_chunk_pause: Duration,
    /// Compare luminance only during detection
    pub luma_only: bool,
    /// Maximum width frames are decoded at for detection
    pub analysis_width: u32,
    /// Parent of every job's working directory
    pub work_dir: PathBuf,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_scene_length_seconds: 2.0,
            detection_threshold: 27.0,
            max_input_size_bytes: 2000 * 1024 * 1024, // 2000 MiB
            supported_extensions: [".mp4", ".avi", ".mkv", ".mov"]
                .into_iter()
                .map(String::from)
                .collect(),
            chunk_size_bytes: 20 * 1024 * 1024, // 20 MiB
            chunk_retry_attempts: 3,
            chunk_retry_base_delay: Duration::from_secs(2),
            inter_chunk_pause: Duration::from_millis(500),
            luma_only: false,
            analysis_width: 320,
            work_dir: PathBuf::from("temp_videos"),
            timeouts: StageTimeouts::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Parse a comma-separated extension list, e.g. `mp4, .MKV`.
pub fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize_extension)
        .collect()
}

impl PipelineConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable keys fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeouts = StageTimeouts {
            detect: env_secs("SCENEBOT_DETECT_TIMEOUT_SECS", defaults.timeouts.detect),
            split: env_secs("SCENEBOT_SPLIT_TIMEOUT_SECS", defaults.timeouts.split),
            reassemble: env_secs(
                "SCENEBOT_REASSEMBLE_TIMEOUT_SECS",
                defaults.timeouts.reassemble,
            ),
            chunk_fetch: env_secs(
                "SCENEBOT_CHUNK_FETCH_TIMEOUT_SECS",
                defaults.timeouts.chunk_fetch,
            ),
            job: env_secs("SCENEBOT_JOB_TIMEOUT_SECS", defaults.timeouts.job),
        };

        Self {
            min_scene_length_seconds: env_or(
                "SCENEBOT_MIN_SCENE_LENGTH_SECS",
                defaults.min_scene_length_seconds,
            ),
            detection_threshold: env_or(
                "SCENEBOT_DETECTION_THRESHOLD",
                defaults.detection_threshold,
            ),
            max_input_size_bytes: env_or(
                "SCENEBOT_MAX_INPUT_SIZE_BYTES",
                defaults.max_input_size_bytes,
            ),
            supported_extensions: std::env::var("SCENEBOT_SUPPORTED_EXTENSIONS")
                .ok()
                .map(|s| parse_extensions(&s))
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.supported_extensions),
            chunk_size_bytes: env_or("SCENEBOT_CHUNK_SIZE_BYTES", defaults.chunk_size_bytes),
            chunk_retry_attempts: env_or(
                "SCENEBOT_CHUNK_MAX_ATTEMPTS",
                defaults.chunk_retry_attempts,
            ),
            chunk_retry_base_delay: env_millis(
                "SCENEBOT_CHUNK_BASE_DELAY_MS",
                defaults.chunk_retry_base_delay,
            ),
            inter_chunk_pause: env_millis("SCENEBOT_CHUNK_PAUSE_MS", defaults.inter_chunk_pause),
            luma_only: env_or("SCENEBOT_LUMA_ONLY", defaults.luma_only),
            analysis_width: env_or("SCENEBOT_ANALYSIS_WIDTH", defaults.analysis_width),
            work_dir: std::env::var("SCENEBOT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            timeouts,
        }
    }

    /// Reject values no job could run with.
    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |msg: &str| Err(PipelineError::Config(msg.to_string()));

        if !(self.min_scene_length_seconds.is_finite() && self.min_scene_length_seconds > 0.0) {
            return fail("min_scene_length_seconds must be positive");
        }
        if !(self.detection_threshold.is_finite() && self.detection_threshold >= 0.0) {
            return fail("detection_threshold must be non-negative");
        }
        if self.chunk_size_bytes == 0 {
            return fail("chunk_size_bytes must be positive");
        }
        if self.chunk_retry_attempts == 0 {
            return fail("chunk_retry_attempts must be at least 1");
        }
        if self.supported_extensions.is_empty() {
            return fail("supported_extensions must not be empty");
        }
        if self.analysis_width < 2 {
            return fail("analysis_width must be at least 2");
        }
        let t = &self.timeouts;
        if [t.detect, t.split, t.reassemble, t.chunk_fetch, t.job]
            .iter()
            .any(Duration::is_zero)
        {
            return fail("timeouts must be non-zero");
        }
        Ok(())
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            supported_extensions: self.supported_extensions.clone(),
            max_input_size_bytes: self.max_input_size_bytes,
            min_duration_seconds: self.min_scene_length_seconds,
        }
    }

    /// Detector settings for a probed source.
    pub fn detect_options(&self, probe: &MediaProbe) -> DetectOptions {
        let every = (probe.frame_rate.round() as u64).max(1) * 5;
        DetectOptions::default()
            .with_threshold(self.detection_threshold)
            .with_min_scene_len_frames(probe.frames_for(self.min_scene_length_seconds))
            .with_luma_only(self.luma_only)
            .with_analysis_width(self.analysis_width)
            .with_progress_every_frames(every)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_scene_length_seconds, 2.0);
        assert_eq!(config.detection_threshold, 27.0);
        assert_eq!(config.max_input_size_bytes, 2_097_152_000);
        assert_eq!(config.chunk_size_bytes, 20_971_520);
        assert_eq!(config.timeouts.split, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(
            parse_extensions("mp4, .MKV,,mov "),
            vec![".mp4", ".mkv", ".mov"]
        );
        assert!(parse_extensions(" , ").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.chunk_size_bytes = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.timeouts.detect = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.min_scene_length_seconds = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detect_options_from_probe() {
        let config = PipelineConfig::default();
        let probe = MediaProbe::from_stream(29.97, 3000, 1920, 1080);
        let options = config.detect_options(&probe);

        // 2s at 29.97fps is 59.94 frames, rounded up
        assert_eq!(options.min_scene_len_frames, 60);
        assert_eq!(options.threshold, 27.0);
        assert_eq!(options.progress_every_frames, 150);
    }

    #[test]
    fn test_validation_limits_follow_config() {
        let mut config = PipelineConfig::default();
        config.max_input_size_bytes = 10;
        let limits = config.validation_limits();
        assert_eq!(limits.max_input_size_bytes, 10);
        assert_eq!(limits.min_duration_seconds, 2.0);
        assert_eq!(limits.supported_extensions.len(), 4);
    }
}
