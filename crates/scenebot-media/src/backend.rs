//! The seam between pipeline stages and the media tools they drive.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use scenebot_models::{MediaProbe, SceneInterval};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::detect::{analysis_dimensions, FfmpegFrameSource, FrameSource, PixelLayout};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Media operations the pipeline needs.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Read stream properties of `path`.
    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe>;

    /// Start decoding `path` into frames no wider than `max_width`.
    async fn open_frames(
        &self,
        path: &Path,
        probe: &MediaProbe,
        layout: PixelLayout,
        max_width: u32,
    ) -> MediaResult<Box<dyn FrameSource>>;

    /// Stream-copy `interval` of `source` into `output`.
    ///
    /// Must give up and clean up its process once `timeout` elapses,
    /// returning [`MediaError::Timeout`].
    async fn cut(
        &self,
        source: &Path,
        interval: &SceneInterval,
        output: &Path,
        timeout: Duration,
    ) -> MediaResult<()>;
}

/// Backend driving the `ffmpeg` and `ffprobe` command line tools.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> MediaResult<MediaProbe> {
        probe_media(path).await
    }

    async fn open_frames(
        &self,
        path: &Path,
        probe: &MediaProbe,
        layout: PixelLayout,
        max_width: u32,
    ) -> MediaResult<Box<dyn FrameSource>> {
        crate::command::check_ffmpeg()?;
        let (width, height) = analysis_dimensions(probe.width, probe.height, max_width);
        debug!(
            "Decoding {} for analysis at {}x{} {}",
            path.display(),
            width,
            height,
            layout.pix_fmt()
        );
        let source = FfmpegFrameSource::spawn(path, width, height, layout)?;
        Ok(Box::new(source))
    }

    async fn cut(
        &self,
        source: &Path,
        interval: &SceneInterval,
        output: &Path,
        timeout: Duration,
    ) -> MediaResult<()> {
        if timeout.is_zero() {
            return Err(MediaError::Timeout(timeout));
        }

        let cmd = FfmpegCommand::new(source, output)
            .seek(interval.start_seconds)
            .duration(interval.duration())
            .codec_copy();

        let progress = FfmpegRunner::new().with_timeout(timeout).run(&cmd).await?;
        debug!(
            "Cut scene {} ({:.2}s-{:.2}s): {} frames",
            interval.index, interval.start_seconds, interval.end_seconds, progress.frame
        );
        Ok(())
    }
}
