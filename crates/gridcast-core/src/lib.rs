//! Gridcast Core - Foundation types for grid video playback
//!
//! This crate provides the fundamental types shared by every gridcast crate:
//! - Time representation (RationalTime, FrameRate)
//! - 8-bit RGB colors
//! - Raw decoded frames and palette-index frame buffers
//! - World geometry for screens and observers
//! - Identifiers and the error taxonomy

pub mod color;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod id;
pub mod time;

pub use color::Rgb;
pub use error::{DecodeError, DownloadError, EngineError, Result, SeekError, SourceError};
pub use frame::{CellChange, CellGrid, FrameBuffer, RgbFrame, SharedFrameBuffer};
pub use geometry::{AspectRatio, Facing, Location};
pub use id::{ObserverId, ScreenId, SessionId};
pub use time::{FrameRate, RationalTime};

/// Cells per edge of one display tile (a single map item in the host world).
pub const TILE_SIZE: u32 = 128;
