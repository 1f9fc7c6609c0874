//! Video decoder using an FFmpeg child process.
//!
//! Uses ffmpeg-sidecar to spawn FFmpeg, which scales to the screen's cell
//! grid and writes packed `rgb24` frames at a constant rate. Frames and log
//! lines arrive through the sidecar's event iterator. Repositioning starts a
//! new process with an input seek and only then retires the old one, so a
//! failed spawn leaves the current read position intact.

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use gridcast_core::{DecodeError, RationalTime, RgbFrame, SeekError, SourceError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::probe::MediaProbe;
use crate::scale::ScaleFilter;
use crate::source::{check_target, FrameSource, SourceInfo, SourceOpener, VideoSource};

/// Opens files through `ffprobe` + `ffmpeg`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegOpener;

impl FfmpegOpener {
    pub fn new() -> Self {
        Self
    }

    /// True when an `ffmpeg` binary can be located.
    pub fn is_available() -> bool {
        ffmpeg_sidecar::command::ffmpeg_is_installed()
    }
}

impl SourceOpener for FfmpegOpener {
    fn open(
        &self,
        source: &VideoSource,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(FfmpegSource::open(&source.path, width, height)?))
    }
}

/// A running FFmpeg child and its event stream.
struct DecoderProcess {
    child: FfmpegChild,
    events: FfmpegIterator,
    /// Most recent error FFmpeg reported
    last_error: Option<String>,
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A video file decoded by FFmpeg.
pub struct FfmpegSource {
    path: PathBuf,
    /// FFmpeg binary
    program: PathBuf,
    info: SourceInfo,
    width: u32,
    height: u32,
    filter: ScaleFilter,
    process: Option<DecoderProcess>,
    /// Timestamp of the first frame the current process emits
    start: RationalTime,
    /// Frames read from the current process
    emitted: u64,
}

impl FfmpegSource {
    /// Probe `path` and start decoding at 0, scaled to `width x height`.
    pub fn open<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let probe = MediaProbe::probe(path)?;
        let info = probe.source_info()?;
        let filter = ScaleFilter::for_sizes((info.width, info.height), (width, height));

        info!(
            path = %path.display(),
            codec = %info.codec,
            native = %format!("{}x{}", info.width, info.height),
            grid = %format!("{width}x{height}"),
            fps = %info.frame_rate,
            duration = %info.duration,
            "Opening video source"
        );

        let mut source = Self {
            path: path.to_path_buf(),
            program: ffmpeg_sidecar::paths::ffmpeg_path(),
            info,
            width,
            height,
            filter,
            process: None,
            start: RationalTime::ZERO,
            emitted: 0,
        };
        source.process = Some(
            source
                .spawn(RationalTime::ZERO)
                .map_err(|e| SourceError::Exhausted(format!("failed to start ffmpeg: {e}")))?,
        );
        Ok(source)
    }

    fn command(&self, start: RationalTime) -> FfmpegCommand {
        let rate = self.info.frame_rate;
        let mut command = FfmpegCommand::new_with_path(&self.program);
        command.hide_banner();
        if !start.is_zero() {
            command.seek(format!("{:.6}", start.to_seconds_f64()));
        }
        command
            .input(&self.path)
            .no_audio()
            .arg("-sn")
            .filter(format!(
                "scale={}:{}:flags={}",
                self.width,
                self.height,
                self.filter.ffmpeg_flag()
            ))
            .args(["-r".to_string(), format!("{}/{}", rate.numerator, rate.denominator)])
            .rawvideo();
        command
    }

    fn spawn(&self, start: RationalTime) -> Result<DecoderProcess, String> {
        debug!(path = %self.path.display(), start = %start, "Spawning ffmpeg");
        let mut child = self.command(start).spawn().map_err(|e| e.to_string())?;
        match child.iter() {
            Ok(events) => Ok(DecoderProcess {
                child,
                events,
                last_error: None,
            }),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e.to_string())
            }
        }
    }

    /// Reap the current process after its event stream ends.
    fn finish_process(&mut self) -> Result<(), DecodeError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        let status = process
            .child
            .wait()
            .map_err(|e| DecodeError::Terminated(e.to_string()))?;
        if status.success() {
            return Ok(());
        }
        Err(DecodeError::Terminated(
            process
                .last_error
                .take()
                .unwrap_or_else(|| format!("ffmpeg exited with {status}")),
        ))
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbFrame>, DecodeError> {
        let expected = (self.width * self.height * 3) as usize;
        loop {
            let Some(process) = self.process.as_mut() else {
                return Ok(None);
            };
            let event = match process.events.next() {
                Some(FfmpegEvent::Done) | None => {
                    self.finish_process()?;
                    return Ok(None);
                }
                Some(event) => event,
            };
            match event {
                FfmpegEvent::OutputFrame(frame) => {
                    let frame_index = self.emitted;
                    self.emitted += 1;
                    if frame.width != self.width
                        || frame.height != self.height
                        || frame.data.len() != expected
                    {
                        warn!(
                            path = %self.path.display(),
                            frame = frame_index,
                            size = frame.data.len(),
                            "Malformed frame"
                        );
                        return Err(DecodeError::Corrupt {
                            frame: frame_index,
                            reason: format!(
                                "{}x{} with {} of {expected} bytes",
                                frame.width,
                                frame.height,
                                frame.data.len()
                            ),
                        });
                    }
                    let pts =
                        self.start + RationalTime::from_frames(frame_index as i64, self.info.frame_rate);
                    return RgbFrame::from_rgb24(self.width, self.height, pts, &frame.data).map(Some);
                }
                FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, line) | FfmpegEvent::Error(line) => {
                    trace!(path = %self.path.display(), %line, "ffmpeg error");
                    process.last_error = Some(line);
                }
                _ => {}
            }
        }
    }

    fn reposition(&mut self, target: RationalTime) -> Result<RationalTime, SeekError> {
        check_target(target, self.info.duration)?;
        let actual = target.floor_to_frame(self.info.frame_rate);

        let process = self.spawn(actual).map_err(SeekError::Reposition)?;
        // Replacing drops the old child, which kills and reaps it.
        self.process = Some(process);
        self.start = actual;
        self.emitted = 0;
        debug!(path = %self.path.display(), target = %target, actual = %actual, "Repositioned");
        Ok(actual)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if self.process.take().is_some() {
            debug!(path = %self.path.display(), "Released ffmpeg decoder");
        }
    }
}
