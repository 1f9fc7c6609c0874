//! 8-bit RGB colors.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// An 8-bit per channel RGB color, laid out like one `rgb24` pixel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(C)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a new color from RGB components.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from signed channel values, clamping each to `0..=255`.
    #[inline]
    pub fn clamped(r: i32, g: i32, b: i32) -> Self {
        Self {
            r: r.clamp(0, 255) as u8,
            g: g.clamp(0, 255) as u8,
            b: b.clamp(0, 255) as u8,
        }
    }

    /// Unpack from `0xRRGGBB`.
    #[inline]
    pub const fn from_u32(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as u8,
            g: ((rgb >> 8) & 0xFF) as u8,
            b: (rgb & 0xFF) as u8,
        }
    }

    /// Pack into `0xRRGGBB`.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Scale every channel by `factor / 255` (used for palette shades).
    #[inline]
    pub fn shade(self, factor: u8) -> Self {
        let f = factor as u32;
        Self {
            r: (self.r as u32 * f / 255) as u8,
            g: (self.g as u32 * f / 255) as u8,
            b: (self.b as u32 * f / 255) as u8,
        }
    }

    /// Perceptually weighted ("redmean") squared distance.
    ///
    /// Cheap integer approximation of a uniform color space: red and blue
    /// errors are weighted by how red the pair is.
    #[inline]
    pub fn redmean_distance(self, other: Self) -> u32 {
        let (r1, g1, b1) = (self.r as i32, self.g as i32, self.b as i32);
        let (r2, g2, b2) = (other.r as i32, other.g as i32, other.b as i32);
        let dr = r1 - r2;
        let dg = g1 - g2;
        let db = b1 - b2;
        let r_mean = (r1 + r2) >> 1;
        (((512 + r_mean) * dr * dr) >> 8) as u32
            + (4 * dg * dg) as u32
            + (((767 - r_mean) * db * db) >> 8) as u32
    }

    /// Luminance (perceived brightness), 0-255.
    #[inline]
    pub fn luminance(self) -> u8 {
        (0.2126 * self.r as f32 + 0.7152 * self.g as f32 + 0.0722 * self.b as f32).round() as u8
    }

    // Common colors
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const BLUE: Self = Self::new(0, 0, 255);
}
