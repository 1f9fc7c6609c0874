//! The fixed set of colors a screen cell can show.

use gridcast_core::Rgb;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PaletteError;

/// One palette slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    /// Index sent to the display sink
    pub index: u8,
    /// Reference color
    pub color: Rgb,
    /// Transparent slots exist in the palette but are never chosen by lookup
    pub selectable: bool,
}

/// Base colors of the built-in map palette. Each base expands to four shades.
const MAP_BASE_COLORS: [u32; 62] = [
    0x000000, // none (transparent)
    0x7FB238, 0xF7E9A3, 0xC7C7C7, 0xFF0000, 0xA0A0FF, 0xA7A7A7, 0x007C00, 0xFFFFFF,
    0xA4A8B8, 0x976D4D, 0x707070, 0x4040FF, 0x8F7748, 0xFFFCF5, 0xD87F33, 0xB24CD8,
    0x6699D8, 0xE5E533, 0x7FCC19, 0xF27FA5, 0x4C4C4C, 0x999999, 0x4C7F99, 0x7F3FB2,
    0x334CB2, 0x664C33, 0x667F33, 0x993333, 0x191919, 0xFAEE4D, 0x5CDBD5, 0x4A80FF,
    0x00D93A, 0x815631, 0x700200, 0xD1B1A1, 0x9F5224, 0x95576C, 0x706C8A, 0xBA8524,
    0x677535, 0xA04D4E, 0x392923, 0x876B62, 0x575C5C, 0x7A4958, 0x4C3E5C, 0x4C3223,
    0x4C522A, 0x8E3C2E, 0x251610, 0xBD3031, 0x943F61, 0x5C191D, 0x167E86, 0x3A8E8C,
    0x562C3E, 0x14B485, 0x646464, 0xD8AF93, 0x7FA796,
];

/// Brightness multipliers (out of 255) for the four shades of each base color.
const MAP_SHADES: [u8; 4] = [180, 220, 255, 135];

/// JSON form of a custom palette entry.
#[derive(Debug, Deserialize)]
struct ColorSpec {
    r: u8,
    g: u8,
    b: u8,
    #[serde(default)]
    transparent: bool,
}

/// An ordered, immutable list of palette entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    /// The built-in map palette: 62 base colors x 4 shades. The four shades
    /// of base color 0 are transparent.
    pub fn builtin() -> Self {
        let entries = MAP_BASE_COLORS
            .iter()
            .enumerate()
            .flat_map(|(base, &rgb)| {
                MAP_SHADES.iter().enumerate().map(move |(shade, &factor)| PaletteEntry {
                    index: (base * 4 + shade) as u8,
                    color: Rgb::from_u32(rgb).shade(factor),
                    selectable: base != 0,
                })
            })
            .collect();
        Self { entries }
    }

    /// A palette of fully selectable colors, indexed in order.
    pub fn from_colors(colors: &[Rgb]) -> Result<Self, PaletteError> {
        Self::from_entries(colors.iter().map(|&c| (c, true)))
    }

    /// Parse a JSON array of `{"r":..,"g":..,"b":..,"transparent":bool}`.
    pub fn from_json(json: &str) -> Result<Self, PaletteError> {
        let specs: Vec<ColorSpec> = serde_json::from_str(json)?;
        Self::from_entries(
            specs
                .into_iter()
                .map(|s| (Rgb::new(s.r, s.g, s.b), !s.transparent)),
        )
    }

    /// Load a JSON palette file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PaletteError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn from_entries(items: impl Iterator<Item = (Rgb, bool)>) -> Result<Self, PaletteError> {
        let items: Vec<(Rgb, bool)> = items.collect();
        if items.len() > 256 {
            return Err(PaletteError::TooManyEntries(items.len()));
        }
        if !items.iter().any(|(_, selectable)| *selectable) {
            return Err(PaletteError::NoSelectableEntry);
        }
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(i, (color, selectable))| PaletteEntry {
                index: i as u8,
                color,
                selectable,
            })
            .collect();
        Ok(Self { entries })
    }

    /// All entries in index order.
    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    /// Entries lookup may choose.
    pub fn selectable(&self) -> impl Iterator<Item = &PaletteEntry> {
        self.entries.iter().filter(|e| e.selectable)
    }

    /// Reference color of `index`.
    pub fn color(&self, index: u8) -> Option<Rgb> {
        self.entries.get(index as usize).map(|e| e.color)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Brute-force nearest selectable entry by redmean distance. Ties go to
    /// the lowest index.
    pub fn nearest_linear(&self, color: Rgb) -> u8 {
        let mut best_distance = u32::MAX;
        let mut best_index = 0u8;
        for entry in self.selectable() {
            let distance = color.redmean_distance(entry.color);
            if distance < best_distance {
                best_distance = distance;
                best_index = entry.index;
            }
        }
        best_index
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layout() {
        let palette = Palette::builtin();
        assert_eq!(palette.len(), 248);
        assert!(!palette.entries()[3].selectable);
        assert!(palette.entries()[4].selectable);
        // White base (8), full-brightness shade (2)
        assert_eq!(palette.color(8 * 4 + 2), Some(Rgb::WHITE));
        assert_eq!(palette.color(8 * 4 + 3), Some(Rgb::new(135, 135, 135)));
    }

    #[test]
    fn test_transparent_never_chosen() {
        let palette = Palette::builtin();
        let idx = palette.nearest_linear(Rgb::BLACK);
        assert!(idx >= 4);
    }

    #[test]
    fn test_from_json() {
        let palette = Palette::from_json(
            r#"[{"r":0,"g":0,"b":0,"transparent":true},{"r":10,"g":20,"b":30}]"#,
        )
        .unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.nearest_linear(Rgb::BLACK), 1);
    }

    #[test]
    fn test_rejects_all_transparent() {
        let err = Palette::from_json(r#"[{"r":0,"g":0,"b":0,"transparent":true}]"#).unwrap_err();
        assert!(matches!(err, PaletteError::NoSelectableEntry));
    }

    #[test]
    fn test_rejects_oversized() {
        let colors = vec![Rgb::BLACK; 257];
        assert!(matches!(
            Palette::from_colors(&colors),
            Err(PaletteError::TooManyEntries(257))
        ));
    }
}
