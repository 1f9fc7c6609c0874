//! World geometry for screens and observers.
//!
//! Screens are axis-aligned flat rectangles. One display tile covers one
//! world block and [`TILE_SIZE`](crate::TILE_SIZE) x `TILE_SIZE` cells.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TILE_SIZE;

/// A point in a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: DVec3,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            position: DVec3::new(x, y, z),
        }
    }

    /// Euclidean distance, or `None` when the points are in different worlds.
    pub fn distance(&self, other: &Location) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        Some(self.position.distance(other.position))
    }

    /// Same world, shifted by `offset`.
    pub fn offset(&self, offset: DVec3) -> Self {
        Self {
            world: self.world.clone(),
            position: self.position + offset,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.1}, {:.1}, {:.1})",
            self.world, self.position.x, self.position.y, self.position.z
        )
    }
}

/// Direction a screen's visible face points towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Facing {
    /// World-space direction in which the screen's columns advance.
    pub fn horizontal_axis(self) -> DVec3 {
        match self {
            Self::North | Self::Up | Self::Down => DVec3::X,
            Self::South => DVec3::NEG_X,
            Self::East => DVec3::Z,
            Self::West => DVec3::NEG_Z,
        }
    }

    /// World-space direction in which the screen's rows advance.
    pub fn vertical_axis(self) -> DVec3 {
        match self {
            Self::Up | Self::Down => DVec3::Z,
            _ => DVec3::NEG_Y,
        }
    }

    /// Centre of a `width x height` cell screen whose top-left corner is `origin`.
    pub fn center(self, origin: &Location, width: u32, height: u32) -> Location {
        let blocks_wide = width as f64 / TILE_SIZE as f64;
        let blocks_high = height as f64 / TILE_SIZE as f64;
        origin.offset(
            self.horizontal_axis() * (blocks_wide / 2.0) + self.vertical_axis() * (blocks_high / 2.0),
        )
    }
}

impl FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(Self::North),
            "south" | "s" => Ok(Self::South),
            "east" | "e" => Ok(Self::East),
            "west" | "w" => Ok(Self::West),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown facing '{other}'")),
        }
    }
}

/// Screen aspect ratio presets used to lay out tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    Ratio16x9,
    Ratio21x9,
    Ratio239x100,
    Ratio185x100,
    Ratio4x3,
    Ratio1x1,
    Ratio2x1,
    Ratio32x9,
}

impl AspectRatio {
    /// Widest layout considered, in tiles.
    pub const MAX_TILES_WIDE: u32 = 64;
    /// Tallest layout considered, in tiles.
    pub const MAX_TILES_HIGH: u32 = 32;

    /// Width and height terms of the ratio.
    pub fn terms(self) -> (u32, u32) {
        match self {
            Self::Ratio16x9 => (16, 9),
            Self::Ratio21x9 => (21, 9),
            Self::Ratio239x100 => (239, 100),
            Self::Ratio185x100 => (185, 100),
            Self::Ratio4x3 => (4, 3),
            Self::Ratio1x1 => (1, 1),
            Self::Ratio2x1 => (2, 1),
            Self::Ratio32x9 => (32, 9),
        }
    }

    /// Largest tile grid with this ratio that uses at most `target_tiles`
    /// tiles. Always at least 1x1.
    pub fn tile_dimensions(self, target_tiles: u32) -> (u32, u32) {
        let (w_term, h_term) = self.terms();
        let mut best = (1, 1);
        let mut best_total = 1;

        for width in 1..=Self::MAX_TILES_WIDE {
            let height = ((width * h_term) as f64 / w_term as f64).round().max(1.0) as u32;
            if height > Self::MAX_TILES_HIGH {
                continue;
            }
            let total = width * height;
            if total <= target_tiles && total > best_total {
                best = (width, height);
                best_total = total;
            }
        }
        best
    }

    /// Cell dimensions of the grid chosen by [`tile_dimensions`](Self::tile_dimensions).
    pub fn cell_dimensions(self, target_tiles: u32) -> (u32, u32) {
        let (w, h) = self.tile_dimensions(target_tiles);
        (w * TILE_SIZE, h * TILE_SIZE)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16:9" => Ok(Self::Ratio16x9),
            "21:9" => Ok(Self::Ratio21x9),
            "2.39:1" => Ok(Self::Ratio239x100),
            "1.85:1" => Ok(Self::Ratio185x100),
            "4:3" => Ok(Self::Ratio4x3),
            "1:1" => Ok(Self::Ratio1x1),
            "2:1" => Ok(Self::Ratio2x1),
            "32:9" => Ok(Self::Ratio32x9),
            other => Err(format!("unknown aspect ratio '{other}'")),
        }
    }
}
