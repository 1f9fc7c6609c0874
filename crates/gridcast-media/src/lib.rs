//! Gridcast Media - video sources for grid playback
//!
//! This crate handles:
//! - The `FrameSource` / `SourceOpener` seam the decode pipeline drives
//! - FFmpeg decoding (child process, scaled `rgb24` output)
//! - Media file probing with `ffprobe`
//! - Deterministic synthetic clips for tests and demos
//! - Resolving user references through local files or `yt-dlp`

pub mod decoder;
pub mod probe;
pub mod resolve;
pub mod scale;
pub mod source;
pub mod synthetic;

pub use decoder::{FfmpegOpener, FfmpegSource};
pub use probe::{MediaProbe, VideoStreamInfo};
pub use resolve::{
    ChainResolver, LocalFileResolver, PassthroughResolver, SourceResolver, YtDlpResolver,
};
pub use scale::{resize, ScaleFilter};
pub use source::{check_target, FrameSource, SourceInfo, SourceOpener, VideoSource};
pub use synthetic::{SyntheticClip, SyntheticOpener, SyntheticSource};
