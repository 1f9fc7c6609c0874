//! Palette subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("palette has {0} entries, at most 256 are addressable")]
    TooManyEntries(usize),
    #[error("palette has no selectable (opaque) entry")]
    NoSelectableEntry,
    #[error("a different palette ({installed} entries) is already installed")]
    AlreadyInstalled { installed: usize },
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
