//! Frame types: raw decoded RGB images and quantized palette-index grids.
//!
//! `FrameBuffer` is immutable once built and travels between threads behind
//! an `Arc` (see [`SharedFrameBuffer`]).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::color::Rgb;
use crate::error::DecodeError;
use crate::time::RationalTime;

/// A decoded video frame in 8-bit RGB, row-major, no padding.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp relative to the start of the source
    pub pts: RationalTime,
    /// Pixel data, `width * height` entries
    pub pixels: Vec<Rgb>,
}

impl RgbFrame {
    /// Create a frame filled with one color.
    pub fn solid(width: u32, height: u32, color: Rgb, pts: RationalTime) -> Self {
        Self {
            width,
            height,
            pts,
            pixels: vec![color; (width * height) as usize],
        }
    }

    /// Wrap a packed `rgb24` byte buffer as produced by FFmpeg.
    pub fn from_rgb24(
        width: u32,
        height: u32,
        pts: RationalTime,
        bytes: &[u8],
    ) -> Result<Self, DecodeError> {
        let expected = (width * height * 3) as usize;
        if bytes.len() != expected {
            return Err(DecodeError::SizeMismatch {
                expected,
                got: bytes.len(),
            });
        }
        let pixels: &[Rgb] = bytemuck::cast_slice(bytes);
        Ok(Self {
            width,
            height,
            pts,
            pixels: pixels.to_vec(),
        })
    }

    /// Pixel at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Mutable pixel at `(x, y)`.
    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut Rgb {
        &mut self.pixels[(y * self.width + x) as usize]
    }

    /// One row of pixels.
    #[inline]
    pub fn row(&self, y: u32) -> &[Rgb] {
        let start = (y * self.width) as usize;
        &self.pixels[start..start + self.width as usize]
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32, pts: RationalTime) -> Self {
        const BARS: [Rgb; 8] = [
            Rgb::WHITE,
            Rgb::new(255, 255, 0), // Yellow
            Rgb::new(0, 255, 255), // Cyan
            Rgb::GREEN,
            Rgb::new(255, 0, 255), // Magenta
            Rgb::RED,
            Rgb::BLUE,
            Rgb::BLACK,
        ];
        let mut frame = Self::solid(width, height, Rgb::BLACK, pts);
        for y in 0..height {
            for x in 0..width {
                let bar = (x * 8 / width.max(1)) as usize;
                *frame.pixel_mut(x, y) = BARS[bar.min(7)];
            }
        }
        frame
    }
}

/// One changed cell in a delta update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellChange {
    pub x: u32,
    pub y: u32,
    /// New palette index
    pub index: u8,
}

/// An immutable grid of palette indices: one decoded and quantized frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    cells: Vec<u8>,
    timestamp: RationalTime,
    seq: u64,
}

impl FrameBuffer {
    /// Build a frame buffer. `cells` must hold exactly `width * height` indices.
    pub fn new(
        width: u32,
        height: u32,
        cells: Vec<u8>,
        timestamp: RationalTime,
        seq: u64,
    ) -> Result<Self, DecodeError> {
        let expected = (width * height) as usize;
        if cells.len() != expected {
            return Err(DecodeError::SizeMismatch {
                expected,
                got: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
            timestamp,
            seq,
        })
    }

    /// A frame where every cell holds `index`.
    pub fn filled(width: u32, height: u32, index: u8, timestamp: RationalTime, seq: u64) -> Self {
        Self {
            width,
            height,
            cells: vec![index; (width * height) as usize],
            timestamp,
            seq,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source timestamp of the frame.
    #[inline]
    pub fn timestamp(&self) -> RationalTime {
        self.timestamp
    }

    /// Sequence number within the session (reset by seeks).
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// All cells, row-major.
    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Number of cells in the grid.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Palette index at `(x, y)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> u8 {
        self.cells[(y * self.width + x) as usize]
    }

    /// Cells that differ from `previous`. A grid of a different size counts
    /// as entirely changed.
    pub fn changes_from(&self, previous: &FrameBuffer) -> Vec<CellChange> {
        if previous.width != self.width || previous.height != self.height {
            return self.all_cells();
        }
        let width = self.width as usize;
        self.cells
            .iter()
            .zip(previous.cells.iter())
            .enumerate()
            .filter(|(_, (new, old))| new != old)
            .map(|(i, (new, _))| CellChange {
                x: (i % width) as u32,
                y: (i / width) as u32,
                index: *new,
            })
            .collect()
    }

    /// Every cell as a change list.
    pub fn all_cells(&self) -> Vec<CellChange> {
        let width = self.width as usize;
        self.cells
            .iter()
            .enumerate()
            .map(|(i, index)| CellChange {
                x: (i % width) as u32,
                y: (i / width) as u32,
                index: *index,
            })
            .collect()
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;

/// A mutable mirror of a screen's contents, as a receiver reconstructs it
/// from full and delta updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellGrid {
    width: u32,
    height: u32,
    cells: Vec<u8>,
}

impl CellGrid {
    /// Replace the whole grid.
    pub fn replace(&mut self, width: u32, height: u32, cells: &[u8]) {
        self.width = width;
        self.height = height;
        self.cells.clear();
        self.cells.extend_from_slice(cells);
    }

    /// Apply a delta. Changes outside the grid are ignored and reported as
    /// `false`.
    pub fn apply(&mut self, changes: &[CellChange]) -> bool {
        let mut in_bounds = true;
        for change in changes {
            if change.x >= self.width || change.y >= self.height {
                in_bounds = false;
                continue;
            }
            self.cells[(change.y * self.width + change.x) as usize] = change.index;
        }
        in_bounds
    }

    /// True until the first full grid arrives.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((y * self.width + x) as usize).copied()
    }
}
