//! FFprobe media information.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use scenebot_models::MediaProbe;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe a media file for frame rate, frame count and resolution.
///
/// The ffprobe process is always waited on before returning, and is killed
/// if the returned future is dropped early.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::unreadable(format!(
            "ffprobe could not open {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let probe = parse_ffprobe_json(&output.stdout)?;

    info!(
        "Video parameters: FPS={:.3}, Frames={}, Resolution={}x{}, Duration={:.2}s",
        probe.frame_rate, probe.frame_count, probe.width, probe.height, probe.duration_seconds
    );

    Ok(probe)
}

/// Turn ffprobe's JSON into a validated probe.
fn parse_ffprobe_json(json: &[u8]) -> MediaResult<MediaProbe> {
    let output: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| MediaError::unreadable(format!("unparsable ffprobe output: {e}")))?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unreadable("No video stream found"))?;

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    // Not every container records a frame count; fall back to duration * fps
    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(n) if n > 0 => n,
        _ => {
            let duration = stream
                .duration
                .as_deref()
                .or(output.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0);
            debug!("No nb_frames in stream, estimating from duration {:.3}s", duration);
            (duration * frame_rate).round().max(0.0) as u64
        }
    };

    let probe = MediaProbe::from_stream(
        frame_rate,
        frame_count,
        stream.width.unwrap_or(0),
        stream.height.unwrap_or(0),
    );

    if !probe.is_valid() {
        return Err(MediaError::InvalidDuration {
            frame_rate,
            frame_count,
        });
    }

    Ok(probe)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
