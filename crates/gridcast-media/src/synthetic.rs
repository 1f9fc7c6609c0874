//! Deterministic in-process sources for tests and demos.
//!
//! A [`SyntheticClip`] describes a scripted video: its frames, frame rate,
//! keyframe spacing, which frames fail to decode, how long each decode
//! takes and whether repositioning works. [`SyntheticOpener`] serves clips
//! by name and records every reposition its sources carry out.

use gridcast_core::{
    DecodeError, FrameRate, RationalTime, Rgb, RgbFrame, SeekError, SourceError,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::scale;
use crate::source::{check_target, FrameSource, SourceInfo, SourceOpener, VideoSource};

/// A scripted video.
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    frames: Arc<Vec<RgbFrame>>,
    frame_count: u64,
    frame_rate: FrameRate,
    keyframe_interval: u64,
    corrupt: Vec<Range<u64>>,
    decode_delay: Duration,
    codec: String,
    open_error: Option<SourceError>,
    reposition_error: Option<SeekError>,
}

impl SyntheticClip {
    /// Play `frames` once each, in order.
    pub fn scripted(frames: Vec<RgbFrame>, frame_rate: FrameRate) -> Self {
        let frame_count = frames.len() as u64;
        Self::cycling(frames, frame_count, frame_rate)
    }

    /// `frame_count` frames cycling through `frames`.
    pub fn cycling(frames: Vec<RgbFrame>, frame_count: u64, frame_rate: FrameRate) -> Self {
        Self {
            frames: Arc::new(frames),
            frame_count,
            frame_rate,
            keyframe_interval: 1,
            corrupt: Vec::new(),
            decode_delay: Duration::ZERO,
            codec: "synthetic".to_string(),
            open_error: None,
            reposition_error: None,
        }
    }

    /// A clip of one flat color.
    pub fn solid(width: u32, height: u32, color: Rgb, duration: RationalTime, rate: FrameRate) -> Self {
        let frame = RgbFrame::solid(width, height, color, RationalTime::ZERO);
        Self::cycling(vec![frame], duration.to_frames(rate).max(0) as u64, rate)
    }

    /// Color bars whose phase moves one column per frame.
    pub fn bars(width: u32, height: u32, duration: RationalTime, rate: FrameRate) -> Self {
        let base = RgbFrame::test_pattern(width, height, RationalTime::ZERO);
        let frames = (0..width.max(1))
            .map(|shift| {
                let mut frame = base.clone();
                for y in 0..height {
                    for x in 0..width {
                        *frame.pixel_mut(x, y) = base.pixel((x + shift) % width, y);
                    }
                }
                frame
            })
            .collect();
        Self::cycling(frames, duration.to_frames(rate).max(0) as u64, rate)
    }

    /// Only every `interval`-th frame is a valid reposition point.
    pub fn keyframe_interval(mut self, interval: u64) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    /// Frames in `range` fail with [`DecodeError::Corrupt`].
    pub fn corrupt_frames(mut self, range: Range<u64>) -> Self {
        self.corrupt.push(range);
        self
    }

    /// Sleep this long per decoded frame.
    pub fn decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Fail every open attempt with `error`.
    pub fn fail_open(mut self, error: SourceError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Reject every in-range reposition with `error`, leaving the read
    /// position where it was.
    pub fn fail_reposition(mut self, error: SeekError) -> Self {
        self.reposition_error = Some(error);
        self
    }

    pub fn duration(&self) -> RationalTime {
        RationalTime::from_frames(self.frame_count as i64, self.frame_rate)
    }

    fn is_corrupt(&self, index: u64) -> bool {
        self.corrupt.iter().any(|r| r.contains(&index))
    }
}

/// Serves [`SyntheticClip`]s by path and counts live sources.
#[derive(Debug, Clone, Default)]
pub struct SyntheticOpener {
    clips: Arc<RwLock<HashMap<PathBuf, SyntheticClip>>>,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    repositions: Arc<Mutex<Vec<RationalTime>>>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `clip` under `name`.
    pub fn insert(&self, name: impl Into<PathBuf>, clip: SyntheticClip) {
        self.clips.write().insert(name.into(), clip);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_clip(self, name: impl Into<PathBuf>, clip: SyntheticClip) -> Self {
        self.insert(name, clip);
        self
    }

    /// Sources opened and not yet dropped.
    pub fn live_sources(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total successful opens.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Positions sources were actually moved to, oldest first.
    pub fn repositions(&self) -> Vec<RationalTime> {
        self.repositions.lock().clone()
    }
}

impl SourceOpener for SyntheticOpener {
    fn open(
        &self,
        source: &VideoSource,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        let clip = self
            .clips
            .read()
            .get(&source.path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(source.path.clone()))?;
        if let Some(err) = clip.open_error.clone() {
            return Err(err);
        }
        if clip.frames.is_empty() {
            return Err(SourceError::NoVideoStream(source.reference.clone()));
        }

        let first = &clip.frames[0];
        let info = SourceInfo {
            duration: clip.duration(),
            frame_rate: clip.frame_rate,
            width: first.width,
            height: first.height,
            codec: clip.codec.clone(),
        };
        self.live.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            clip,
            info,
            width,
            height,
            cursor: 0,
            live: Arc::clone(&self.live),
            repositions: Arc::clone(&self.repositions),
        }))
    }
}

/// An opened [`SyntheticClip`].
pub struct SyntheticSource {
    clip: SyntheticClip,
    info: SourceInfo,
    width: u32,
    height: u32,
    cursor: u64,
    live: Arc<AtomicUsize>,
    repositions: Arc<Mutex<Vec<RationalTime>>>,
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbFrame>, DecodeError> {
        if self.cursor >= self.clip.frame_count {
            return Ok(None);
        }
        let index = self.cursor;
        self.cursor += 1;

        if !self.clip.decode_delay.is_zero() {
            std::thread::sleep(self.clip.decode_delay);
        }
        if self.clip.is_corrupt(index) {
            return Err(DecodeError::Corrupt {
                frame: index,
                reason: "injected corruption".into(),
            });
        }

        let template = &self.clip.frames[(index % self.clip.frames.len() as u64) as usize];
        let mut frame = scale::resize(template, self.width, self.height);
        frame.pts = RationalTime::from_frames(index as i64, self.clip.frame_rate);
        Ok(Some(frame))
    }

    fn reposition(&mut self, target: RationalTime) -> Result<RationalTime, SeekError> {
        check_target(target, self.info.duration)?;
        if let Some(err) = self.clip.reposition_error.clone() {
            return Err(err);
        }
        let frame = target.to_frames(self.clip.frame_rate).max(0) as u64;
        let keyframe = frame - frame % self.clip.keyframe_interval;
        self.cursor = keyframe;
        let actual = RationalTime::from_frames(keyframe as i64, self.clip.frame_rate);
        self.repositions.lock().push(actual);
        Ok(actual)
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
