//! Ordered dithering.
//!
//! The perturbation added to a pixel depends only on its coordinate and,
//! in temporal mode, the frame index. Two runs over the same input always
//! produce the same grid.

use serde::{Deserialize, Serialize};

/// 8x8 Bayer threshold matrix, values 0..64.
const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Dithering algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DitherMode {
    /// Plain nearest-color mapping
    None,
    /// 8x8 ordered dithering; temporally stable, so deltas stay small
    #[default]
    Bayer,
}

/// Dithering settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DitherConfig {
    pub mode: DitherMode,
    /// Peak per-channel offset, 0..=128
    pub amplitude: u8,
    /// Shift the matrix origin every frame. Hides banding on static shots
    /// at the cost of more changed cells per frame.
    pub temporal: bool,
}

impl Default for DitherConfig {
    fn default() -> Self {
        Self {
            mode: DitherMode::Bayer,
            amplitude: 24,
            temporal: false,
        }
    }
}

impl DitherConfig {
    /// No dithering at all.
    pub const OFF: Self = Self {
        mode: DitherMode::None,
        amplitude: 0,
        temporal: false,
    };

    /// Offset to add to each channel of the pixel at `(x, y)` in frame
    /// `frame_index`. Range is roughly `-amplitude..=amplitude`.
    #[inline]
    pub fn offset(&self, x: u32, y: u32, frame_index: u64) -> i32 {
        match self.mode {
            DitherMode::None => 0,
            DitherMode::Bayer => {
                let (ox, oy) = if self.temporal {
                    ((frame_index.wrapping_mul(3) & 7) as u32, (frame_index.wrapping_mul(5) & 7) as u32)
                } else {
                    (0, 0)
                };
                let threshold = BAYER_8X8[((y & 7) + oy) as usize & 7][((x & 7) + ox) as usize & 7] as i32;
                let amplitude = self.amplitude.min(128) as i32;
                ((threshold * 2 + 1) * amplitude) / 64 - amplitude
            }
        }
    }

    /// True when [`offset`](Self::offset) is zero everywhere.
    pub fn is_off(&self) -> bool {
        self.mode == DitherMode::None || self.amplitude == 0
    }
}
