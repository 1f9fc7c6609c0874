//! Playback positions and frame rates.
//!
//! Positions are exact fractions of a second, so advancing the clock by a
//! frame period any number of times lands exactly on frame boundaries.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A position or span on a media timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RationalTime(Rational64);

impl RationalTime {
    pub const ZERO: Self = Self(Rational64::new_raw(0, 1));

    /// `numerator / denominator` seconds.
    #[inline]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self(Rational64::new(numerator, denominator))
    }

    /// Start of frame `frames` at `rate`.
    #[inline]
    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self::new(frames * rate.denominator as i64, rate.numerator as i64)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        Self::new(millis, 1000)
    }

    /// Wall-clock time elapsed, kept to the microsecond.
    pub fn from_duration(duration: Duration) -> Self {
        Self::new(duration.as_micros() as i64, 1_000_000)
    }

    /// Float seconds, as probes and scaled clocks report them. Rounded to
    /// the microsecond.
    pub fn from_seconds_f64(seconds: f64) -> Self {
        Self::new((seconds * 1e6).round() as i64, 1_000_000)
    }

    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.0.numer() as f64 / *self.0.denom() as f64
    }

    /// Whole milliseconds, rounded down.
    #[inline]
    pub fn to_millis(self) -> i64 {
        (self.0 * 1000).floor().to_integer()
    }

    /// Index of the frame containing this position.
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        (self.0 * Rational64::new(rate.numerator as i64, rate.denominator as i64))
            .floor()
            .to_integer()
    }

    /// The start of the frame containing this time, never later than `self`.
    #[inline]
    pub fn floor_to_frame(self, rate: FrameRate) -> Self {
        Self::from_frames(self.to_frames(rate), rate)
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        *self.0.numer() == 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        *self.0.numer() < 0
    }

    /// Restrict to `[min, max]`.
    #[inline]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        self.max(min).min(max)
    }

    /// Format as `m:ss` or `h:mm:ss`.
    pub fn to_clock_string(self) -> String {
        let seconds = self.to_millis().max(0) / 1000;
        let (hours, minutes) = (seconds / 3600, seconds / 60 % 60);
        if hours > 0 {
            format!("{hours}:{minutes:02}:{:02}", seconds % 60)
        } else {
            format!("{minutes}:{:02}", seconds % 60)
        }
    }
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for RationalTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds_f64())
    }
}

/// Frames per second as `numerator / denominator`, e.g. `30000/1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub const FPS_20: Self = Self::new(20, 1);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);

    /// Rate assumed when a source reports nothing usable.
    pub const FALLBACK: Self = Self::FPS_20;

    /// Highest rate accepted from a probed source.
    pub const MAX_FPS: f64 = 120.0;

    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Build from a probed float rate. Missing, non-positive and implausibly
    /// high rates (above 120 fps) fall back to [`FrameRate::FALLBACK`].
    pub fn from_fps_f64(fps: f64) -> Self {
        if !fps.is_finite() || fps <= 0.0 || fps > Self::MAX_FPS {
            return Self::FALLBACK;
        }
        if (fps - fps.round()).abs() < 1e-6 {
            return Self::new(fps.round() as u32, 1);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    /// Parse an FFmpeg-style `num/den` rate string such as `30000/1001`.
    pub fn parse_ratio(s: &str) -> Option<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim().parse::<u32>().ok()?, d.trim().parse::<u32>().ok()?),
            None => return s.trim().parse::<f64>().ok().map(Self::from_fps_f64),
        };
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self::new(num, den))
    }

    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Wall-clock interval between two frames.
    #[inline]
    pub fn frame_interval(self) -> Duration {
        Duration::from_secs_f64(self.denominator as f64 / self.numerator as f64)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FALLBACK
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{fps:.3} fps")
        }
    }
}
