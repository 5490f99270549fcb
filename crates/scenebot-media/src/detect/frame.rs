//! Decoded frames and frame sources.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{collect_stderr, FfmpegCommand};
use crate::progress::FfmpegProgress;
use crate::error::{MediaError, MediaResult};

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 8-bit RGB
    Rgb24,
    /// 8-bit luminance only
    Gray8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Rgb24 => 3,
            PixelLayout::Gray8 => 1,
        }
    }

    /// FFmpeg `-pix_fmt` name.
    pub fn pix_fmt(&self) -> &'static str {
        match self {
            PixelLayout::Rgb24 => "rgb24",
            PixelLayout::Gray8 => "gray",
        }
    }
}

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap raw pixel data, checking its length against the dimensions.
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> MediaResult<Self> {
        let expected = frame_size(width, height, layout);
        if data.len() != expected {
            return Err(MediaError::internal(format!(
                "frame buffer is {} bytes, expected {} for {}x{} {}",
                data.len(),
                expected,
                width,
                height,
                layout.pix_fmt()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// A frame where every byte has the same value.
    pub fn solid(width: u32, height: u32, layout: PixelLayout, value: u8) -> Self {
        Self {
            width,
            height,
            layout,
            data: vec![value; frame_size(width, height, layout)],
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Bytes in one frame.
pub fn frame_size(width: u32, height: u32, layout: PixelLayout) -> usize {
    width as usize * height as usize * layout.bytes_per_pixel()
}

/// Size frames are decoded at for analysis.
///
/// Scales down to at most `max_width` keeping the aspect ratio; both sides
/// are even so every pixel format accepts them.
pub fn analysis_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let even = |x: u32| x.max(2) & !1;
    let max_width = max_width.max(2);

    if width == 0 || height == 0 {
        return (even(max_width), even(max_width * 9 / 16));
    }

    let target_width = width.min(max_width);
    let target_height = (height as u64 * target_width as u64 / width as u64) as u32;
    (even(target_width), even(target_height))
}

/// Sequential stream of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Wait for the decoder to exit after the last frame was read.
    async fn finish(&mut self) -> MediaResult<()>;

    /// Stop decoding immediately and release the decoder.
    async fn abort(&mut self);
}

/// Frames piped out of an FFmpeg child process as raw video.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<(FfmpegProgress, String)>>,
    width: u32,
    height: u32,
    layout: PixelLayout,
}

impl FfmpegFrameSource {
    /// Start decoding `path` at `width`x`height`.
    pub fn spawn(path: &Path, width: u32, height: u32, layout: PixelLayout) -> MediaResult<Self> {
        let cmd = FfmpegCommand::new(path, "pipe:1")
            .video_only()
            .video_filter(format!("scale={width}:{height}"))
            .output_args(["-pix_fmt", layout.pix_fmt(), "-f", "rawvideo"]);

        let mut child = cmd.spawn_piped()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let capacity = frame_size(width, height, layout).max(8 * 1024);
        Ok(Self {
            child,
            stdout: BufReader::with_capacity(capacity, stdout),
            stderr: Some(collect_stderr(stderr)),
            width,
            height,
            layout,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let size = frame_size(self.width, self.height, self.layout);
        let mut data = vec![0u8; size];
        let mut filled = 0;

        while filled < size {
            let n = self.stdout.read(&mut data[filled..]).await?;
            if n == 0 {
                if filled > 0 {
                    debug!("Discarding partial trailing frame ({} of {} bytes)", filled, size);
                }
                return Ok(None);
            }
            filled += n;
        }

        Ok(Some(Frame {
            width: self.width,
            height: self.height,
            layout: self.layout,
            data,
        }))
    }

    async fn finish(&mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        if status.success() {
            return Ok(());
        }

        let stderr_tail = match self.stderr.take() {
            Some(handle) => handle.await.map(|(_, tail)| tail).unwrap_or_default(),
            None => String::new(),
        };
        Err(MediaError::ffmpeg_failed(
            "FFmpeg decoder exited with non-zero status",
            (!stderr_tail.is_empty()).then_some(stderr_tail),
            status.code(),
        ))
    }

    async fn abort(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill FFmpeg decoder: {}", e);
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_dimensions_downscale() {
        assert_eq!(analysis_dimensions(1920, 1080, 320), (320, 180));
        assert_eq!(analysis_dimensions(1280, 720, 256), (256, 144));
    }

    #[test]
    fn test_analysis_dimensions_keep_small_sources_and_stay_even() {
        assert_eq!(analysis_dimensions(160, 90, 320), (160, 90));
        assert_eq!(analysis_dimensions(101, 57, 320), (100, 56));
        assert_eq!(analysis_dimensions(0, 0, 320), (320, 180));
    }

    #[test]
    fn test_frame_new_checks_length() {
        assert!(Frame::new(4, 2, PixelLayout::Rgb24, vec![0; 24]).is_ok());
        assert!(Frame::new(4, 2, PixelLayout::Gray8, vec![0; 24]).is_err());
        assert_eq!(Frame::solid(4, 2, PixelLayout::Gray8, 9).data.len(), 8);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decoder_failure_carries_stderr() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "echo 'frame=0' >&2; echo 'moov atom not found' >&2; exit 1"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();
        let mut source = FfmpegFrameSource {
            child,
            stdout: BufReader::new(stdout),
            stderr: Some(collect_stderr(stderr)),
            width: 4,
            height: 2,
            layout: PixelLayout::Gray8,
        };

        assert!(source.next_frame().await.unwrap().is_none());
        match source.finish().await {
            Err(MediaError::FfmpegFailed {
                stderr, exit_code, ..
            }) => {
                assert_eq!(stderr.as_deref(), Some("moov atom not found"));
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
