//! Engine configuration.
//!
//! Stored as JSON. Every field has a default, so a partial file (or none at
//! all) is valid.

use gridcast_color::{DitherConfig, PaletteError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("cannot load palette: {0}")]
    Palette(#[from] PaletteError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Highest rate at which observers receive frames
    pub target_fps: u32,
    /// Decoded frames buffered per session
    pub queue_capacity: usize,
    /// Consecutive undecodable frames tolerated before a session fails
    pub max_consecutive_decode_failures: u32,
    /// Fraction of changed cells above which a full frame is sent instead of a delta
    pub full_frame_threshold: f64,
    /// Distance within which observers see a screen
    pub visibility_radius: f64,
    /// Events buffered per observer before it is marked for resync
    pub observer_buffer: usize,
    pub seek_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    /// Largest screen edge in cells
    pub max_screen_cells: u32,
    /// Palette index shown on idle screens
    pub idle_index: u8,
    pub dither: DitherConfig,
    /// Custom palette JSON; the built-in palette when unset
    pub palette: Option<PathBuf>,
    /// Where downloaded videos are stored
    pub download_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_fps: 20,
            queue_capacity: 4,
            max_consecutive_decode_failures: 8,
            full_frame_threshold: 0.6,
            visibility_radius: 32.0,
            observer_buffer: 64,
            seek_timeout_ms: 5_000,
            stop_timeout_ms: 2_000,
            max_screen_cells: 8192,
            idle_index: 119,
            dither: DitherConfig::default(),
            palette: None,
            download_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Self::default_path();
        if default.is_file() {
            return Self::load(&default);
        }
        info!("No config file, using defaults");
        Ok(Self::default())
    }

    /// Save as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridcast")
            .join("config.json")
    }

    /// Directory for downloaded videos.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gridcast")
                .join("videos")
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_fps == 0 {
            return Err(ConfigError::Invalid("target_fps must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".into()));
        }
        if self.observer_buffer == 0 {
            return Err(ConfigError::Invalid("observer_buffer must be positive".into()));
        }
        if !(self.full_frame_threshold > 0.0 && self.full_frame_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "full_frame_threshold {} outside (0, 1]",
                self.full_frame_threshold
            )));
        }
        if !self.visibility_radius.is_finite() || self.visibility_radius < 0.0 {
            return Err(ConfigError::Invalid("visibility_radius must be >= 0".into()));
        }
        if self.max_screen_cells == 0 {
            return Err(ConfigError::Invalid("max_screen_cells must be positive".into()));
        }
        Ok(())
    }

    /// Minimum spacing between two frames sent to observers.
    pub fn publish_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.target_fps.max(1)))
    }

    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
