//! Gridcast Color - Projecting full-color frames onto a small palette.
//!
//! - `Palette`: the fixed set of renderable colors (built-in map palette or
//!   a custom JSON list)
//! - `PaletteMapper`: O(1) nearest-color lookup through a precomputed table
//! - `DitherConfig`: deterministic ordered (Bayer) dithering
//! - `Quantizer`: turns an RGB frame into a palette-index `FrameBuffer`

pub mod dither;
pub mod error;
pub mod lut;
pub mod palette;
pub mod quantize;

pub use dither::{DitherConfig, DitherMode};
pub use error::PaletteError;
pub use lut::PaletteMapper;
pub use palette::{Palette, PaletteEntry};
pub use quantize::Quantizer;
