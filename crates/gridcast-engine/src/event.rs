//! Events delivered to observers' display sinks.

use gridcast_core::{CellChange, CellGrid, ScreenId, SharedFrameBuffer};
use std::sync::Arc;

/// One update for one screen. Payloads are shared between all observers
/// receiving the same update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Complete grid contents.
    Full {
        screen: ScreenId,
        frame: SharedFrameBuffer,
    },
    /// Cells that changed since the previous update to this observer.
    Delta {
        screen: ScreenId,
        seq: u64,
        changes: Arc<[CellChange]>,
    },
}

impl DisplayEvent {
    pub fn full(screen: ScreenId, frame: SharedFrameBuffer) -> Self {
        Self::Full { screen, frame }
    }

    pub fn screen(&self) -> ScreenId {
        match self {
            Self::Full { screen, .. } | Self::Delta { screen, .. } => *screen,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::Full { frame, .. } => frame.seq(),
            Self::Delta { seq, .. } => *seq,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    /// Number of cells carried.
    pub fn cell_count(&self) -> usize {
        match self {
            Self::Full { frame, .. } => frame.cell_count(),
            Self::Delta { changes, .. } => changes.len(),
        }
    }

    /// Update a receiver-side mirror. Returns `false` for a delta that
    /// arrives before any full frame or addresses cells outside the grid.
    pub fn apply_to(&self, grid: &mut CellGrid) -> bool {
        match self {
            Self::Full { frame, .. } => {
                grid.replace(frame.width(), frame.height(), frame.cells());
                true
            }
            Self::Delta { changes, .. } => !grid.is_empty() && grid.apply(changes),
        }
    }
}
