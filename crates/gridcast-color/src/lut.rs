//! Precomputed nearest-color lookup.
//!
//! The RGB cube is split into 64x64x64 cells (6 bits per channel). Each cell
//! stores the nearest selectable palette index for the cell's centre, so a
//! lookup is one table read. Exact palette colors bypass the table, which
//! makes quantizing an already-quantized color return the same index.

use gridcast_core::Rgb;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::PaletteError;
use crate::palette::Palette;

/// Bits kept per channel when indexing the table.
pub const LUT_BITS: u32 = 6;
const LUT_SIDE: usize = 1 << LUT_BITS;
const SHIFT: u32 = 8 - LUT_BITS;

static GLOBAL: OnceCell<Arc<PaletteMapper>> = OnceCell::new();

/// Maps any RGB color to a palette index. Immutable after construction.
pub struct PaletteMapper {
    palette: Palette,
    table: Box<[u8]>,
    exact: HashMap<Rgb, u8>,
}

impl PaletteMapper {
    /// Build the lookup table for `palette` (parallel over the red axis).
    pub fn new(palette: Palette) -> Self {
        let started = Instant::now();
        let plane = LUT_SIDE * LUT_SIDE;
        let mut table = vec![0u8; plane * LUT_SIDE].into_boxed_slice();

        table
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(r, chunk)| {
                let red = cell_center(r);
                for g in 0..LUT_SIDE {
                    let green = cell_center(g);
                    for b in 0..LUT_SIDE {
                        chunk[g * LUT_SIDE + b] =
                            palette.nearest_linear(Rgb::new(red, green, cell_center(b)));
                    }
                }
            });

        // Entries are visited in index order so duplicates keep the lowest index.
        let mut exact = HashMap::new();
        for entry in palette.selectable() {
            exact.entry(entry.color).or_insert(entry.index);
        }

        debug!(
            entries = palette.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built palette lookup table"
        );

        Self {
            palette,
            table,
            exact,
        }
    }

    /// Install the process-wide mapper. Only the first call builds a table.
    /// Installing the same palette again returns the existing mapper; a
    /// different one is refused, since every session shares the table.
    pub fn install(palette: Palette) -> Result<Arc<PaletteMapper>, PaletteError> {
        let mut built = false;
        let mapper = GLOBAL
            .get_or_init(|| {
                built = true;
                info!(entries = palette.len(), "Installing palette");
                Arc::new(Self::new(palette.clone()))
            })
            .clone();
        if !built && mapper.palette != palette {
            warn!(
                installed = mapper.palette.len(),
                requested = palette.len(),
                "Palette already installed"
            );
            return Err(PaletteError::AlreadyInstalled {
                installed: mapper.palette.len(),
            });
        }
        Ok(mapper)
    }

    /// Install a palette loaded from a JSON file.
    pub fn install_from_file(path: &std::path::Path) -> Result<Arc<PaletteMapper>, PaletteError> {
        Self::install(Palette::load(path)?)
    }

    /// The process-wide mapper, installing the built-in palette if nothing
    /// was installed yet.
    pub fn global() -> Arc<PaletteMapper> {
        GLOBAL
            .get_or_init(|| {
                info!("Installing built-in palette");
                Arc::new(Self::new(Palette::builtin()))
            })
            .clone()
    }

    /// Nearest selectable palette index for `color`.
    #[inline]
    pub fn nearest_index(&self, color: Rgb) -> u8 {
        if let Some(&index) = self.exact.get(&color) {
            return index;
        }
        self.table[table_offset(color)]
    }

    /// Nearest index for signed channel values, clamped to `0..=255` first.
    #[inline]
    pub fn nearest_index_clamped(&self, r: i32, g: i32, b: i32) -> u8 {
        self.nearest_index(Rgb::clamped(r, g, b))
    }

    /// The palette this mapper was built from.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

impl std::fmt::Debug for PaletteMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaletteMapper")
            .field("entries", &self.palette.len())
            .field("table_len", &self.table.len())
            .finish()
    }
}

#[inline]
fn cell_center(cell: usize) -> u8 {
    ((cell << SHIFT) | (1 << (SHIFT - 1))) as u8
}

#[inline]
fn table_offset(color: Rgb) -> usize {
    ((color.r as usize >> SHIFT) << (2 * LUT_BITS))
        | ((color.g as usize >> SHIFT) << LUT_BITS)
        | (color.b as usize >> SHIFT)
}
