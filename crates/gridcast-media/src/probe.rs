//! Media file probing to get metadata without a full decode.

use gridcast_core::{FrameRate, RationalTime, SourceError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::source::SourceInfo;

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: String,
    /// Container duration
    pub duration: RationalTime,
    /// Video streams
    pub video_streams: Vec<VideoStreamInfo>,
    /// Container format
    pub format: String,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub pixel_format: String,
    pub bit_rate: Option<u64>,
}

// ffprobe -print_format json output, only the fields used here.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

impl MediaProbe {
    /// Probe a media file with `ffprobe`.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        if !path.exists() {
            return Err(SourceError::NotFound(path.to_path_buf()));
        }

        let output = Command::new(ffmpeg_sidecar::ffprobe::ffprobe_path())
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| SourceError::Exhausted(format!("failed to spawn ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::Unreadable {
                path: path_str,
                reason: last_line(&stderr).unwrap_or("ffprobe failed").to_string(),
            });
        }

        let probe = Self::from_json(&path_str, &String::from_utf8_lossy(&output.stdout))?;
        debug!(
            path = %probe.path,
            duration = %probe.duration,
            streams = probe.video_streams.len(),
            "Probed media"
        );
        Ok(probe)
    }

    /// Build from `ffprobe -print_format json -show_format -show_streams`
    /// output.
    pub fn from_json(path: &str, json: &str) -> Result<Self, SourceError> {
        let parsed: FfprobeOutput =
            serde_json::from_str(json).map_err(|e| SourceError::Unreadable {
                path: path.to_string(),
                reason: format!("unexpected ffprobe output: {e}"),
            })?;

        let format = parsed.format.as_ref();
        let mut duration = format
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_seconds);

        let mut video_streams = Vec::new();
        for stream in &parsed.streams {
            if stream.codec_type.as_deref() != Some("video") {
                continue;
            }
            if duration.is_none() {
                duration = stream.duration.as_deref().and_then(parse_seconds);
            }
            video_streams.push(VideoStreamInfo {
                index: stream.index,
                codec: stream.codec_name.clone().unwrap_or_default(),
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                frame_rate: sanitize_frame_rate(
                    path,
                    stream.avg_frame_rate.as_deref(),
                    stream.r_frame_rate.as_deref(),
                ),
                pixel_format: stream.pix_fmt.clone().unwrap_or_default(),
                bit_rate: stream.bit_rate.as_deref().and_then(|b| b.parse().ok()),
            });
        }

        Ok(Self {
            path: path.to_string(),
            duration: duration.unwrap_or(RationalTime::ZERO),
            video_streams,
            format: format
                .and_then(|f| f.format_name.clone())
                .unwrap_or_default(),
        })
    }

    /// Check if the file has video.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Get the primary video stream info.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Playback metadata of the primary video stream.
    pub fn source_info(&self) -> Result<SourceInfo, SourceError> {
        let stream = self
            .primary_video()
            .ok_or_else(|| SourceError::NoVideoStream(self.path.clone()))?;
        if stream.codec.is_empty() || stream.width == 0 || stream.height == 0 {
            return Err(SourceError::UnsupportedCodec(if stream.codec.is_empty() {
                "unknown".to_string()
            } else {
                stream.codec.clone()
            }));
        }
        Ok(SourceInfo {
            duration: self.duration,
            frame_rate: stream.frame_rate,
            width: stream.width,
            height: stream.height,
            codec: stream.codec.clone(),
        })
    }
}

/// Pick the stream's frame rate, falling back to 20 fps when neither the
/// average nor the real base rate is usable.
fn sanitize_frame_rate(path: &str, avg: Option<&str>, real: Option<&str>) -> FrameRate {
    for candidate in [avg, real].into_iter().flatten() {
        if let Some(rate) = FrameRate::parse_ratio(candidate) {
            let fps = rate.to_fps_f64();
            if fps > 0.0 && fps <= FrameRate::MAX_FPS {
                return rate;
            }
        }
    }
    warn!(
        path,
        avg = avg.unwrap_or("-"),
        real = real.unwrap_or("-"),
        fallback = %FrameRate::FALLBACK,
        "Unusable frame rate, using fallback"
    );
    FrameRate::FALLBACK
}

fn parse_seconds(s: &str) -> Option<RationalTime> {
    let seconds: f64 = s.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(RationalTime::from_seconds_f64(seconds))
}

pub(crate) fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
