//! Source abstractions shared by every decoder backend.

use gridcast_core::{DecodeError, FrameRate, RationalTime, RgbFrame, SeekError, SourceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A resolved, playable video reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoSource {
    /// What the user asked for (URL, query or path)
    pub reference: String,
    /// Where the decoder should read from
    pub path: PathBuf,
}

impl VideoSource {
    pub fn new(reference: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            path: path.into(),
        }
    }

    /// A source whose reference is its own path.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(path.to_string_lossy(), path)
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

/// Container and stream metadata of an opened source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub duration: RationalTime,
    /// Sanitised native frame rate
    pub frame_rate: FrameRate,
    /// Native frame size before scaling
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

impl SourceInfo {
    /// Number of whole frames in the source.
    pub fn frame_count(&self) -> u64 {
        self.duration.to_frames(self.frame_rate).max(0) as u64
    }
}

/// An opened, exclusively owned decoder. Dropping it releases every
/// decoder resource.
pub trait FrameSource: Send {
    fn info(&self) -> &SourceInfo;

    /// Next frame in presentation order, `Ok(None)` at end of stream.
    /// A `DecodeError` affects only the frame it reports; the following call
    /// continues with the next frame.
    fn next_frame(&mut self) -> Result<Option<RgbFrame>, DecodeError>;

    /// Move to the nearest decodable point at or before `target` and return
    /// it. The next frame produced has exactly that timestamp.
    fn reposition(&mut self, target: RationalTime) -> Result<RationalTime, SeekError>;
}

/// Opens sources scaled to a screen's cell grid.
pub trait SourceOpener: Send + Sync {
    fn open(
        &self,
        source: &VideoSource,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Reject targets outside `[0, duration]`.
pub fn check_target(target: RationalTime, duration: RationalTime) -> Result<(), SeekError> {
    if target.is_negative() || target > duration {
        return Err(SeekError::OutOfRange { target, duration });
    }
    Ok(())
}
