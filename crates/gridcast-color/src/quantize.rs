//! RGB frame to palette-index grid.

use gridcast_core::{DecodeError, FrameBuffer, RgbFrame};
use rayon::prelude::*;
use std::sync::Arc;

use crate::dither::DitherConfig;
use crate::lut::PaletteMapper;

/// Quantizes decoded frames against one palette. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Quantizer {
    mapper: Arc<PaletteMapper>,
    dither: DitherConfig,
}

impl Quantizer {
    pub fn new(mapper: Arc<PaletteMapper>, dither: DitherConfig) -> Self {
        Self { mapper, dither }
    }

    /// Quantizer over the process-wide palette.
    pub fn global(dither: DitherConfig) -> Self {
        Self::new(PaletteMapper::global(), dither)
    }

    pub fn mapper(&self) -> &Arc<PaletteMapper> {
        &self.mapper
    }

    pub fn dither(&self) -> DitherConfig {
        self.dither
    }

    /// Map every pixel of `frame` to a palette index. `frame_index` only
    /// matters for temporal dithering; `seq` is stamped on the result.
    pub fn quantize(
        &self,
        frame: &RgbFrame,
        frame_index: u64,
        seq: u64,
    ) -> Result<FrameBuffer, DecodeError> {
        let width = frame.width as usize;
        let expected = width * frame.height as usize;
        if frame.pixels.len() != expected {
            return Err(DecodeError::SizeMismatch {
                expected,
                got: frame.pixels.len(),
            });
        }

        let mut cells = vec![0u8; expected];
        if width > 0 {
            cells
                .par_chunks_mut(width)
                .zip(frame.pixels.par_chunks(width))
                .enumerate()
                .for_each(|(y, (out, row))| self.quantize_row(y as u32, row, out, frame_index));
        }

        FrameBuffer::new(frame.width, frame.height, cells, frame.pts, seq)
    }

    fn quantize_row(&self, y: u32, row: &[gridcast_core::Rgb], out: &mut [u8], frame_index: u64) {
        if self.dither.is_off() {
            for (cell, pixel) in out.iter_mut().zip(row) {
                *cell = self.mapper.nearest_index(*pixel);
            }
            return;
        }
        for (x, (cell, pixel)) in out.iter_mut().zip(row).enumerate() {
            let d = self.dither.offset(x as u32, y, frame_index);
            *cell = self.mapper.nearest_index_clamped(
                pixel.r as i32 + d,
                pixel.g as i32 + d,
                pixel.b as i32 + d,
            );
        }
    }
}
